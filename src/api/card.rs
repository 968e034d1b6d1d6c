use crate::helpers::millis_to_utc;
use crate::{ApiClient, ApiError, ApiResponse, AsyncHttpClient, Profile, SyncHttpClient};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use std::future::Future;

const CARD_PATH: &str = "/v1/me/card";
const CARD_TRANSACTIONS_PATH: &str = "/v1/me/card/transactions";

/// Campus card of the authenticated user.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct CardInfo {
    pub user: Option<Profile>,
    pub card_no: Option<String>,
    pub card_id: Option<String>,
    pub bank_no: Option<String>,
    pub card_balance: Option<f64>,
    // Lowercase on the wire.
    #[serde(rename = "transbalance")]
    pub trans_balance: Option<f64>,
    pub lost: Option<bool>,
    pub frozen: Option<bool>,
}

/// A single campus card transaction.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct CardTransaction {
    /// Milliseconds since the Unix epoch.
    pub date_time: Option<i64>,
    pub system: Option<String>,
    pub merchant: Option<String>,
    pub description: Option<String>,
    pub amount: Option<f64>,
    pub card_balance: Option<f64>,
}
impl CardTransaction {
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.date_time.and_then(millis_to_utc)
    }
}

/// Filters for [`ApiClient::card_transactions`]. Unset filters are omitted from the request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CardTransactionsOptions {
    pub card_no: Option<String>,
    /// Milliseconds since the Unix epoch.
    pub begin_date: Option<i64>,
    /// Milliseconds since the Unix epoch.
    pub end_date: Option<i64>,
}
impl CardTransactionsOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_card_no(mut self, card_no: String) -> Self {
        self.card_no = Some(card_no);
        self
    }

    pub fn set_begin_date(mut self, begin_date: DateTime<Utc>) -> Self {
        self.begin_date = Some(begin_date.timestamp_millis());
        self
    }

    pub fn set_end_date(mut self, end_date: DateTime<Utc>) -> Self {
        self.end_date = Some(end_date.timestamp_millis());
        self
    }

    fn query(&self) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();
        if let Some(card_no) = self.card_no.as_ref().filter(|card_no| !card_no.is_empty()) {
            query.push(("cardNo", card_no.clone()));
        }
        if let Some(begin_date) = self.begin_date {
            query.push(("beginDate", begin_date.to_string()));
        }
        if let Some(end_date) = self.end_date {
            query.push(("endDate", end_date.to_string()));
        }
        query
    }
}

impl ApiClient {
    /// Fetches the campus card of the authenticated user (`GET /v1/me/card`).
    pub fn card_info<C>(&self, http_client: &C) -> Result<CardInfo, ApiError<<C as SyncHttpClient>::Error>>
    where
        C: SyncHttpClient,
    {
        self.fetch(CARD_PATH, &[], http_client)?.into_first()
    }

    /// Asynchronously fetches the campus card of the authenticated user.
    pub fn card_info_async<'c, C>(
        &self,
        http_client: &'c C,
    ) -> impl Future<Output = Result<CardInfo, ApiError<<C as AsyncHttpClient<'c>>::Error>>> + 'c
    where
        C: AsyncHttpClient<'c>,
    {
        let response = self.fetch_async::<CardInfo, C>(CARD_PATH, &[], http_client);
        Box::pin(async move { response.await?.into_first() })
    }

    /// Lists campus card transactions (`GET /v1/me/card/transactions`).
    ///
    /// The returned [`ApiResponse`] also carries the paging information reported by the server.
    pub fn card_transactions<C>(
        &self,
        options: &CardTransactionsOptions,
        http_client: &C,
    ) -> Result<ApiResponse<CardTransaction>, ApiError<<C as SyncHttpClient>::Error>>
    where
        C: SyncHttpClient,
    {
        self.fetch(CARD_TRANSACTIONS_PATH, &options.query(), http_client)
    }

    /// Asynchronously lists campus card transactions.
    pub fn card_transactions_async<'c, C>(
        &self,
        options: &CardTransactionsOptions,
        http_client: &'c C,
    ) -> impl Future<
        Output = Result<ApiResponse<CardTransaction>, ApiError<<C as AsyncHttpClient<'c>>::Error>>,
    > + 'c
    where
        C: AsyncHttpClient<'c>,
    {
        self.fetch_async(CARD_TRANSACTIONS_PATH, &options.query(), http_client)
    }
}
