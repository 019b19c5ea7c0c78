//! PostgREST query strings.
use reqwest::Url;
use std::fmt::Display;

use crate::error::{Result, StoreError};
use crate::events::Table;

/// A read/update/delete target: table, embedded select, equality filters,
/// ordering and limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    table: Table,
    select: String,
    filters: Vec<(String, String)>,
    order: Option<String>,
    limit: Option<usize>,
}

impl Query {
    pub fn table(table: Table) -> Self {
        Self {
            table,
            select: "*".to_string(),
            filters: Vec::new(),
            order: None,
            limit: None,
        }
    }

    pub fn select(mut self, columns: &str) -> Self {
        self.select = columns.to_string();
        self
    }

    pub fn eq(mut self, column: &str, value: impl Display) -> Self {
        self.filters
            .push((column.to_string(), format!("eq.{}", value)));
        self
    }

    pub fn eq_opt<V: Display>(self, column: &str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.eq(column, v),
            None => self,
        }
    }

    pub fn is_null(mut self, column: &str) -> Self {
        self.filters.push((column.to_string(), "is.null".to_string()));
        self
    }

    pub fn newest_first(mut self) -> Self {
        self.order = Some("created_at.desc".to_string());
        self
    }

    pub fn limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn target(&self) -> Table {
        self.table
    }

    /// Full URL under `{base}/rest/v1/`.
    pub fn url(&self, base: &Url) -> Result<Url> {
        let mut url = table_url(base, self.table)?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("select", &self.select);
            for (column, predicate) in &self.filters {
                pairs.append_pair(column, predicate);
            }
            if let Some(order) = &self.order {
                pairs.append_pair("order", order);
            }
            if let Some(limit) = self.limit {
                pairs.append_pair("limit", &limit.to_string());
            }
        }
        Ok(url)
    }
}

pub fn table_url(base: &Url, table: Table) -> Result<Url> {
    base.join(&format!("rest/v1/{}", table.as_str()))
        .map_err(|e| StoreError::Persistence(format!("invalid backend URL: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://demo.supabase.co/").unwrap()
    }

    fn pairs(url: &Url) -> Vec<(String, String)> {
        url.query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[test]
    fn listing_query_has_filters_order_and_limit() {
        let url = Query::table(Table::Products)
            .eq("type", "donate")
            .eq("status", "active")
            .is_null("deleted_at")
            .newest_first()
            .limit(Some(8))
            .url(&base())
            .unwrap();

        assert_eq!(url.path(), "/rest/v1/products");
        assert_eq!(
            pairs(&url),
            vec![
                ("select".into(), "*".into()),
                ("type".into(), "eq.donate".into()),
                ("status".into(), "eq.active".into()),
                ("deleted_at".into(), "is.null".into()),
                ("order".into(), "created_at.desc".into()),
                ("limit".into(), "8".into()),
            ]
        );
    }

    #[test]
    fn optional_filters_are_skipped() {
        let url = Query::table(Table::Sellers)
            .select("*,products(id,title,status)")
            .eq_opt::<&str>("status", None)
            .url(&base())
            .unwrap();
        assert_eq!(
            pairs(&url),
            vec![("select".into(), "*,products(id,title,status)".into())]
        );
    }
}
