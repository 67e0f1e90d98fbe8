use crate::app::{Params, RequestBody, RequestHead};
use crate::model::{PagingKeys, PagingOptions, SortType};
use axum::body::Bytes;
use serde_json::Value;

/// Request head with the reserved paging parameters (`$page`, `$pageSize`, `$sortBy`,
/// `$sortType`) split out of the ordinary parameters.
#[derive(Clone, Debug)]
pub struct Context {
    pub head: RequestHead,
    pub params: Params,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
    pub sort_by: Option<String>,
    pub sort_type: Option<SortType>,
}

impl Context {
    pub fn from_head(head: RequestHead) -> Self {
        let paging = PagingOptions::from_params(&head.params, PagingKeys::RESERVED);
        let params = head
            .params
            .iter()
            .filter(|(key, _)| !PagingKeys::RESERVED.contains(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        Self {
            head,
            params,
            page: paging.page,
            page_size: paging.page_size,
            sort_by: paging.sort_by,
            sort_type: paging.sort_type,
        }
    }

    pub fn paging(&self) -> PagingOptions {
        PagingOptions {
            page: self.page,
            page_size: self.page_size,
            sort_by: self.sort_by.clone(),
            sort_type: self.sort_type,
        }
    }
}

/// Request payload, picked from the decoded body: JSON, then form, then raw bytes.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    Json(Value),
    Form(Value),
    Raw(Bytes),
    Empty,
}

impl Payload {
    pub fn from_body(body: RequestBody) -> Self {
        if let Some(json) = body.json {
            Payload::Json(json)
        } else if let Some(form) = body.form {
            Payload::Form(form)
        } else if let Some(raw) = body.body {
            Payload::Raw(raw)
        } else {
            Payload::Empty
        }
    }

    /// JSON view; raw bytes become a string when they are valid UTF-8.
    pub fn to_value(&self) -> Value {
        match self {
            Payload::Json(v) | Payload::Form(v) => v.clone(),
            Payload::Raw(bytes) => match std::str::from_utf8(bytes) {
                Ok(text) => Value::String(text.to_string()),
                Err(_) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
            },
            Payload::Empty => Value::Null,
        }
    }
}
