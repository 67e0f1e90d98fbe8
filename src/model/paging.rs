use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_PAGE_SIZE: u64 = 50;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortType {
    Ascending,
    Descending,
}

impl SortType {
    pub fn as_i32(&self) -> i32 {
        match self {
            SortType::Ascending => 1,
            SortType::Descending => -1,
        }
    }

    /// Accepts `1` / `-1` as numbers or strings, and `asc` / `desc`.
    pub fn from_value(value: &Value) -> Option<SortType> {
        match value {
            Value::Number(n) => match n.as_i64()? {
                1 => Some(SortType::Ascending),
                -1 => Some(SortType::Descending),
                _ => None,
            },
            Value::String(s) => match s.to_ascii_lowercase().as_str() {
                "1" | "asc" => Some(SortType::Ascending),
                "-1" | "desc" => Some(SortType::Descending),
                _ => None,
            },
            _ => None,
        }
    }
}

impl Serialize for SortType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.as_i32())
    }
}

impl<'de> Deserialize<'de> for SortType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        SortType::from_value(&value).ok_or_else(|| D::Error::custom(format!("invalid sort type: {}", value)))
    }
}

/// Client supplied paging: 1-based page, page size and an optional single sort key.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PagingOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_type: Option<SortType>,
}

/// Parameter names paging is read from.
#[derive(Clone, Copy, Debug)]
pub struct PagingKeys {
    pub page: &'static str,
    pub page_size: &'static str,
    pub sort_by: &'static str,
    pub sort_type: &'static str,
}

impl PagingKeys {
    pub const PLAIN: PagingKeys = PagingKeys {
        page: "page",
        page_size: "pageSize",
        sort_by: "sortBy",
        sort_type: "sortType",
    };

    pub const RESERVED: PagingKeys = PagingKeys {
        page: "$page",
        page_size: "$pageSize",
        sort_by: "$sortBy",
        sort_type: "$sortType",
    };

    pub fn contains(&self, key: &str) -> bool {
        key == self.page || key == self.page_size || key == self.sort_by || key == self.sort_type
    }
}

fn as_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl PagingOptions {
    pub fn new(page: u64, page_size: u64) -> Self {
        Self {
            page: Some(page),
            page_size: Some(page_size),
            ..Self::default()
        }
    }

    pub fn sorted_by(mut self, field: impl Into<String>, sort_type: SortType) -> Self {
        self.sort_by = Some(field.into());
        self.sort_type = Some(sort_type);
        self
    }

    /// Lenient read from request parameters; unparsable values are treated as absent.
    pub fn from_params(params: &Map<String, Value>, keys: PagingKeys) -> Self {
        Self {
            page: params.get(keys.page).and_then(as_count),
            page_size: params.get(keys.page_size).and_then(as_count),
            sort_by: params
                .get(keys.sort_by)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            sort_type: params.get(keys.sort_type).and_then(SortType::from_value),
        }
    }

    /// Fills page 1 and a page size of `DEFAULT_PAGE_SIZE` where absent.
    pub fn with_defaults(&self) -> Self {
        Self {
            page: Some(self.page.unwrap_or(DEFAULT_PAGE)),
            page_size: Some(self.page_size.unwrap_or(DEFAULT_PAGE_SIZE)),
            ..self.clone()
        }
    }

    /// Limit, skip and sort a backend applies for these options.
    pub fn find_options(&self) -> FindOptions {
        let limit = self.page_size;
        let skip = match (self.page, self.page_size) {
            (Some(page), Some(size)) => Some(size.saturating_mul(page.saturating_sub(1))),
            _ => None,
        };
        let sort = self
            .sort_by
            .clone()
            .map(|field| (field, self.sort_type.unwrap_or(SortType::Ascending)));
        FindOptions { limit, skip, sort }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FindOptions {
    pub limit: Option<u64>,
    pub skip: Option<u64>,
    pub sort: Option<(String, SortType)>,
}

/// One page of results with totals computed over the unpaged selection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PagedData<T> {
    pub data: Vec<T>,
    pub page: u64,
    pub page_size: u64,
    pub last_page: u64,
    pub total: u64,
}

impl<T> PagedData<T> {
    pub fn new(data: Vec<T>, page: u64, page_size: u64, total: u64) -> Self {
        Self {
            data,
            page,
            page_size,
            last_page: last_page(total, page_size),
            total,
        }
    }

    pub fn with_data<U>(self, data: Vec<U>) -> PagedData<U> {
        PagedData {
            data,
            page: self.page,
            page_size: self.page_size,
            last_page: self.last_page,
            total: self.total,
        }
    }
}

/// `ceil(total / page_size)`; zero when the page size is zero.
pub fn last_page(total: u64, page_size: u64) -> u64 {
    if page_size == 0 {
        0
    } else {
        total.div_ceil(page_size)
    }
}
