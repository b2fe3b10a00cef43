//! PostgREST query-string composition: select/join, filters, order, limit.

use std::fmt::Display;

use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    fn as_str(self) -> &'static str {
        match self {
            Direction::Asc => "asc",
            Direction::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Query {
    select: Option<String>,
    filters: Vec<(String, String)>,
    order: Option<(String, Direction)>,
    limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Column list, including embedded joins such as `users!fk(col,...)`.
    pub fn select(mut self, columns: &str) -> Self {
        self.select = Some(columns.to_string());
        self
    }

    pub fn eq(mut self, column: &str, value: impl Display) -> Self {
        self.filters.push((column.to_string(), format!("eq.{value}")));
        self
    }

    pub fn order(mut self, column: &str, direction: Direction) -> Self {
        self.order = Some((column.to_string(), direction));
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    pub(crate) fn apply(&self, url: &mut Url) {
        if self.select.is_none() && self.filters.is_empty() && self.order.is_none() && self.limit.is_none() {
            return;
        }
        let mut pairs = url.query_pairs_mut();
        if let Some(select) = &self.select {
            pairs.append_pair("select", select);
        }
        for (column, filter) in &self.filters {
            pairs.append_pair(column, filter);
        }
        if let Some((column, direction)) = &self.order {
            pairs.append_pair("order", &format!("{column}.{}", direction.as_str()));
        }
        if let Some(limit) = self.limit {
            pairs.append_pair("limit", &limit.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(query: Query) -> Vec<(String, String)> {
        let mut url = Url::parse("https://project.example/rest/v1/posts").unwrap();
        query.apply(&mut url);
        url.query_pairs().into_owned().collect()
    }

    #[test]
    fn composes_select_filter_order_limit() {
        let q = Query::new()
            .select("*,users!posts_user_id_fkey(username)")
            .eq("user_id", "abc")
            .order("created_at", Direction::Desc)
            .limit(1);
        assert_eq!(
            pairs(q),
            vec![
                ("select".to_string(), "*,users!posts_user_id_fkey(username)".to_string()),
                ("user_id".to_string(), "eq.abc".to_string()),
                ("order".to_string(), "created_at.desc".to_string()),
                ("limit".to_string(), "1".to_string()),
            ]
        );
    }

    #[test]
    fn empty_query_leaves_url_bare() {
        let mut url = Url::parse("https://project.example/rest/v1/posts").unwrap();
        Query::new().apply(&mut url);
        assert_eq!(url.query(), None);
    }
}
