//! Transaction listing: filter assembly and cursor pagination.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use super::client::BendClient;
use super::transport::ApiRequest;
use crate::error::{Error, Result};
use crate::models::{Transaction, TransactionCount, TransactionPage};

pub const SORT_BY_TIMESTAMP: &str = "txn_timestamp";
pub const SORT_DESC: &str = "DESC";
pub const COUNT_BY_MONTH: &str = "month";

/// One transaction query. Unset or empty fields are left out of the query string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionFilters {
    /// Page size; zero lets the server pick.
    pub limit: u32,
    /// Opaque cursor from the previous page.
    pub after: Option<String>,
    /// Aggregation period, e.g. `month`.
    pub count_by: Option<String>,
    /// Symbolic range, e.g. `this_month`.
    pub time_filter: Option<String>,
    /// Extra `include[]` value.
    pub include: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub account_ids: Vec<String>,
    pub category_id: Option<String>,
    pub subcategory_id: Option<String>,
    /// `include[]=count_by_totals`
    pub include_count_by: bool,
    /// `include[]=detailed_search_summary`
    pub include_detailed: bool,
    /// Match category OR subcategory instead of both.
    pub or_category: bool,
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|v| !v.is_empty())
}

impl TransactionFilters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filters for a date range sorted newest first, with monthly totals and
    /// the detailed summary, matching either category or subcategory.
    pub fn detailed(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        category_id: Option<&str>,
        subcategory_id: Option<&str>,
    ) -> Self {
        Self {
            sort_by: Some(SORT_BY_TIMESTAMP.to_string()),
            sort_order: Some(SORT_DESC.to_string()),
            start_date: Some(start),
            end_date: Some(end),
            count_by: Some(COUNT_BY_MONTH.to_string()),
            category_id: category_id.map(str::to_string),
            subcategory_id: subcategory_id.map(str::to_string),
            include_count_by: true,
            include_detailed: true,
            or_category: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    #[must_use]
    pub fn after(mut self, cursor: impl Into<String>) -> Self {
        self.after = Some(cursor.into());
        self
    }

    #[must_use]
    pub fn count_by(mut self, period: impl Into<String>) -> Self {
        self.count_by = Some(period.into());
        self
    }

    #[must_use]
    pub fn time_filter(mut self, filter: impl Into<String>) -> Self {
        self.time_filter = Some(filter.into());
        self
    }

    #[must_use]
    pub fn include(mut self, value: impl Into<String>) -> Self {
        self.include = Some(value.into());
        self
    }

    #[must_use]
    pub fn sort(mut self, by: impl Into<String>, order: impl Into<String>) -> Self {
        self.sort_by = Some(by.into());
        self.sort_order = Some(order.into());
        self
    }

    #[must_use]
    pub const fn date_range(mut self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        self.start_date = start;
        self.end_date = end;
        self
    }

    #[must_use]
    pub fn account_id(mut self, id: impl Into<String>) -> Self {
        self.account_ids.push(id.into());
        self
    }

    #[must_use]
    pub fn category_id(mut self, id: impl Into<String>) -> Self {
        self.category_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn subcategory_id(mut self, id: impl Into<String>) -> Self {
        self.subcategory_id = Some(id.into());
        self
    }

    #[must_use]
    pub const fn include_count_by(mut self, enabled: bool) -> Self {
        self.include_count_by = enabled;
        self
    }

    #[must_use]
    pub const fn include_detailed(mut self, enabled: bool) -> Self {
        self.include_detailed = enabled;
        self
    }

    #[must_use]
    pub const fn or_category(mut self, enabled: bool) -> Self {
        self.or_category = enabled;
        self
    }

    /// Query string pairs in a stable order.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = Vec::new();
        let mut push = |key: &str, value: &str| pairs.push((key.to_string(), value.to_string()));

        if self.limit > 0 {
            push("limit", &self.limit.to_string());
        }
        if let Some(after) = non_empty(self.after.as_ref()) {
            push("after", after);
        }
        if let Some(count_by) = non_empty(self.count_by.as_ref()) {
            push("count_by", count_by);
        }
        if let Some(time_filter) = non_empty(self.time_filter.as_ref()) {
            push("time_filter", time_filter);
        }
        if let Some(include) = non_empty(self.include.as_ref()) {
            push("include[]", include);
        }

        if let Some(sort_by) = non_empty(self.sort_by.as_ref()) {
            push("sort_by", sort_by);
        }
        if let Some(sort_order) = non_empty(self.sort_order.as_ref()) {
            push("sort_order", sort_order);
        }

        if let Some(start) = self.start_date {
            push("start_date", &start.to_rfc3339_opts(SecondsFormat::Secs, true));
        }
        if let Some(end) = self.end_date {
            push("end_date", &end.to_rfc3339_opts(SecondsFormat::Secs, true));
        }

        if let Some(category_id) = non_empty(self.category_id.as_ref()) {
            push("category_id", category_id);
        }
        for account_id in self.account_ids.iter().filter(|id| !id.is_empty()) {
            push("account_id[]", account_id);
        }
        if let Some(subcategory_id) = non_empty(self.subcategory_id.as_ref()) {
            push("subcategory_id", subcategory_id);
        }

        if self.include_count_by {
            push("include[]", "count_by_totals");
        }
        if self.include_detailed {
            push("include[]", "detailed_search_summary");
        }
        if self.or_category {
            push("or[]", "subcategory_id");
            push("or[]", "category_id");
        }

        pairs
    }
}

/// Every page of a query, concatenated.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TransactionSet {
    pub transactions: Vec<Transaction>,
    pub counts: Vec<TransactionCount>,
    /// Total matching count reported by the last page.
    pub total: u64,
    /// Number of requests issued.
    pub pages: usize,
}

fn transactions_path(user_id: &str) -> String {
    format!("/api/v3/users/{}/transactions", urlencoding::encode(user_id))
}

impl BendClient {
    /// Fetch one page.
    pub async fn fetch_transactions(
        &mut self,
        user_id: &str,
        filters: &TransactionFilters,
    ) -> Result<TransactionPage> {
        self.require_session()?;
        if user_id.is_empty() {
            return Err(Error::InvalidInput("user id is required".to_string()));
        }

        let request = ApiRequest::get(transactions_path(user_id)).query(filters.query_pairs());
        let page: TransactionPage = self.transport.execute(request).await?.into_data()?;
        tracing::debug!(
            received = page.transactions.len(),
            total = page.total,
            has_more = !page.after.is_empty(),
            "transaction page fetched"
        );
        Ok(page)
    }

    /// Follow the cursor until it is empty or a page comes back short.
    ///
    /// Any failing page fails the whole call; no partial result is returned.
    pub async fn fetch_all_transactions(
        &mut self,
        user_id: &str,
        filters: TransactionFilters,
    ) -> Result<TransactionSet> {
        let page_size = filters.limit as usize;
        let mut filters = filters;
        let mut set = TransactionSet::default();

        loop {
            let page = self.fetch_transactions(user_id, &filters).await?;
            set.pages += 1;
            set.total = page.total;

            let received = page.transactions.len();
            set.transactions.extend(page.transactions);
            set.counts.extend(page.counts);

            if page.after.is_empty() || (page_size > 0 && received < page_size) {
                break;
            }
            filters = filters.after(page.after);
        }

        tracing::info!(
            pages = set.pages,
            transactions = set.transactions.len(),
            total = set.total,
            "fetched all transactions"
        );
        Ok(set)
    }
}
