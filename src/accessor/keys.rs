//! Cache key generation.
//!
//! Keys are colon-delimited: `{resource}:{variant}:{param}:{param}...`.
//! Parameters always appear in a fixed order. `:`, `=` and `%` inside a
//! parameter are percent-escaped, an unset parameter is an empty segment and
//! a set-but-empty one is `%00`, so two requests share a key exactly when
//! they share every parameter.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Segment separator.
pub const DELIMITER: char = ':';

/// Stands in for a parameter that is present but empty. Escaped text never
/// contains it, since every literal `%` becomes `%25`.
const EMPTY_SEGMENT: &str = "%00";

/// Escapes the delimiter, the filter separator `=` and the escape character
/// itself.
pub fn escape_segment(raw: &str) -> Cow<'_, str> {
    if raw.contains([DELIMITER, '=', '%']) {
        Cow::Owned(
            raw.replace('%', "%25")
                .replace(DELIMITER, "%3A")
                .replace('=', "%3D"),
        )
    } else {
        Cow::Borrowed(raw)
    }
}

// == Resource ==
/// Validated resource name, the first key segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Resource(String);

impl Resource {
    /// Accepts lowercase ASCII letters, digits, `_` and `-`.
    ///
    /// # Examples
    ///
    /// ```
    /// use storefront_cache::Resource;
    ///
    /// let products = Resource::new("products").unwrap();
    /// assert_eq!(products.root_prefix(), "products:");
    /// assert!(Resource::new("Products:v2").is_err());
    /// ```
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');
        if !valid {
            return Err(Error::InvalidKey(format!(
                "resource name '{}' must match [a-z0-9_-]+",
                name
            )));
        }
        Ok(Self(name))
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    /// Prefix covering every key of this resource. Ends with the delimiter so
    /// `products:` never matches `products_archive:...`.
    pub fn root_prefix(&self) -> String {
        format!("{}{}", self.0, DELIMITER)
    }

    /// Prefix covering every key of one variant, e.g. `products:all:`.
    pub fn variant_prefix(&self, variant: &str) -> String {
        format!("{}{}{}{}", self.0, DELIMITER, escape_segment(variant), DELIMITER)
    }

    /// Starts a key for `variant`.
    pub fn key(&self, variant: &str) -> KeyBuilder {
        KeyBuilder {
            key: format!("{}{}{}", self.0, DELIMITER, escape_segment(variant)),
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// == Key Builder ==
/// Appends escaped parameter segments to a key.
#[derive(Debug, Clone)]
pub struct KeyBuilder {
    key: String,
}

impl KeyBuilder {
    /// Appends one parameter. An empty value is written as `%00`.
    pub fn segment(mut self, value: impl fmt::Display) -> Self {
        let value = value.to_string();
        self.key.push(DELIMITER);
        if value.is_empty() {
            self.key.push_str(EMPTY_SEGMENT);
        } else {
            self.key.push_str(&escape_segment(&value));
        }
        self
    }

    /// Appends an optional parameter; `None` becomes an empty segment so the
    /// positions of later parameters do not shift.
    pub fn optional<T: fmt::Display>(mut self, value: Option<T>) -> Self {
        match value {
            Some(value) => self.segment(value),
            None => {
                self.key.push(DELIMITER);
                self
            }
        }
    }

    /// Appends a `name=value` parameter. Both sides are escaped, so the
    /// unescaped `=` is the only separator.
    pub fn pair(mut self, name: &str, value: &str) -> Self {
        self.key.push(DELIMITER);
        self.key.push_str(&escape_segment(name));
        self.key.push('=');
        self.key.push_str(&escape_segment(value));
        self
    }

    pub fn build(self) -> String {
        self.key
    }
}

// == Sort Order ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortOrder::Asc => f.write_str("asc"),
            SortOrder::Desc => f.write_str("desc"),
        }
    }
}

// == List Params ==
/// Filters, paging and sorting for listing queries.
///
/// Every field is part of the cache key. `filters` holds resource-specific
/// extras; being a `BTreeMap`, insertion order never affects the key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub search: Option<String>,
    pub category: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<SortOrder>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub status: Option<String>,
    pub filters: BTreeMap<String, String>,
}

impl ListParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn sort(mut self, sort_by: impl Into<String>, order: SortOrder) -> Self {
        self.sort_by = Some(sort_by.into());
        self.sort_order = Some(order);
        self
    }

    pub fn price_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min_price = min;
        self.max_price = max;
        self
    }

    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn filter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(name.into(), value.into());
        self
    }

    /// Appends every parameter to `key` in fixed order, extras last as
    /// `name=value` segments sorted by name.
    pub fn append_to(&self, key: KeyBuilder) -> KeyBuilder {
        let key = key
            .optional(self.page)
            .optional(self.limit)
            .optional(self.search.as_deref())
            .optional(self.category.as_deref())
            .optional(self.sort_by.as_deref())
            .optional(self.sort_order)
            .optional(self.min_price)
            .optional(self.max_price)
            .optional(self.status.as_deref());

        self.filters
            .iter()
            .fold(key, |key, (name, value)| key.pair(name, value))
    }

    /// Query-string pairs for the remote API, omitting unset parameters.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        let mut push = |name: &str, value: Option<String>| {
            if let Some(value) = value {
                pairs.push((name.to_string(), value));
            }
        };

        push("page", self.page.map(|v| v.to_string()));
        push("limit", self.limit.map(|v| v.to_string()));
        push("search", self.search.clone());
        push("category", self.category.clone());
        push("sortBy", self.sort_by.clone());
        push("sortOrder", self.sort_order.map(|v| v.to_string()));
        push("minPrice", self.min_price.map(|v| v.to_string()));
        push("maxPrice", self.max_price.map(|v| v.to_string()));
        push("status", self.status.clone());

        for (name, value) in &self.filters {
            pairs.push((name.clone(), value.clone()));
        }
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn products() -> Resource {
        Resource::new("products").unwrap()
    }

    #[test]
    fn test_resource_validation() {
        assert!(Resource::new("sales-orders").is_ok());
        assert!(Resource::new("employees_2024").is_ok());
        assert!(matches!(Resource::new(""), Err(Error::InvalidKey(_))));
        assert!(matches!(Resource::new("Products"), Err(Error::InvalidKey(_))));
        assert!(matches!(Resource::new("a:b"), Err(Error::InvalidKey(_))));
    }

    #[test]
    fn test_prefixes() {
        let resource = products();
        assert_eq!(resource.root_prefix(), "products:");
        assert_eq!(resource.variant_prefix("all"), "products:all:");
    }

    #[test]
    fn test_default_listing_key_has_every_position() {
        let key = ListParams::new().append_to(products().key("all")).build();
        assert_eq!(key, "products:all:::::::::");
    }

    #[test]
    fn test_full_listing_key() {
        let params = ListParams::new()
            .page(2)
            .limit(20)
            .search("desk")
            .category("furniture")
            .sort("price", SortOrder::Desc)
            .price_range(Some(10.5), Some(99.0))
            .status("active");

        let key = params.append_to(products().key("all")).build();
        assert_eq!(
            key,
            "products:all:2:20:desk:furniture:price:desc:10.5:99:active"
        );
    }

    #[test]
    fn test_distinct_params_never_collide() {
        let page_one = ListParams::new().page(1).append_to(products().key("all")).build();
        let limit_one = ListParams::new().limit(1).append_to(products().key("all")).build();
        assert_ne!(page_one, limit_one);
    }

    #[test]
    fn test_escaped_delimiter_keeps_segments_apart() {
        let tricky = ListParams::new()
            .search("a:b")
            .append_to(products().key("all"))
            .build();
        let split = ListParams::new()
            .search("a")
            .category("b")
            .append_to(products().key("all"))
            .build();

        assert_ne!(tricky, split);
        assert!(tricky.contains("a%3Ab"));
        assert_eq!(escape_segment("50%"), "50%25");
    }

    #[test]
    fn test_equals_sign_in_filters_keeps_pairs_apart() {
        let name_side = ListParams::new().filter("a=b", "c");
        let value_side = ListParams::new().filter("a", "b=c");

        let name_key = name_side.append_to(products().key("all")).build();
        let value_key = value_side.append_to(products().key("all")).build();

        assert_ne!(name_key, value_key);
        assert!(name_key.ends_with(":a%3Db=c"));
        assert!(value_key.ends_with(":a=b%3Dc"));
        assert_ne!(name_side.query_pairs(), value_side.query_pairs());
    }

    #[test]
    fn test_empty_value_differs_from_unset() {
        let unset = ListParams::new().append_to(products().key("all")).build();
        let empty = ListParams::new()
            .search("")
            .append_to(products().key("all"))
            .build();
        let literal = ListParams::new()
            .search("%00")
            .append_to(products().key("all"))
            .build();

        assert_ne!(unset, empty);
        assert_eq!(empty, "products:all:::%00::::::");
        assert_ne!(empty, literal);
        assert_eq!(
            ListParams::new().search("").query_pairs(),
            vec![("search".to_string(), String::new())]
        );
    }

    #[test]
    fn test_filters_are_order_independent() {
        let a = ListParams::new()
            .filter("warehouse", "north")
            .filter("brand", "acme");
        let b = ListParams::new()
            .filter("brand", "acme")
            .filter("warehouse", "north");

        let key_a = a.append_to(products().key("all")).build();
        let key_b = b.append_to(products().key("all")).build();

        assert_eq!(key_a, key_b);
        assert!(key_a.ends_with(":brand=acme:warehouse=north"));
    }

    #[test]
    fn test_query_pairs_skip_unset() {
        let params = ListParams::new().page(3).sort("name", SortOrder::Asc);

        assert_eq!(
            params.query_pairs(),
            vec![
                ("page".to_string(), "3".to_string()),
                ("sortBy".to_string(), "name".to_string()),
                ("sortOrder".to_string(), "asc".to_string()),
            ]
        );
    }
}
