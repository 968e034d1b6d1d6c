use crate::{ApiClient, ApiError, AsyncHttpClient, SyncHttpClient};

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use std::future::Future;

const USER_POSITIONS_PATH: &str = "/v1/enterprise/user/positions";

/// Positions held by a staff member.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
#[non_exhaustive]
pub struct Positions {
    pub account: Option<String>,
    pub name: Option<String>,
    pub positions: Option<Vec<Position>>,
}

/// A post within a department.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
#[non_exhaustive]
pub struct Position {
    pub post: Option<Post>,
    pub dept: Option<Dept>,
}

#[skip_serializing_none]
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct Post {
    pub post_code: Option<String>,
    pub post_name: Option<String>,
    /// Whether this is a formal (as opposed to acting or part-time) appointment.
    pub formal: Option<bool>,
}

#[skip_serializing_none]
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct Dept {
    pub organize_id: Option<String>,
    pub organize_name: Option<String>,
    pub parent_organize_id: Option<String>,
    pub independent: Option<bool>,
}

impl ApiClient {
    /// Fetches the positions of the authenticated staff member
    /// (`GET /v1/enterprise/user/positions`).
    pub fn user_positions<C>(
        &self,
        http_client: &C,
    ) -> Result<Positions, ApiError<<C as SyncHttpClient>::Error>>
    where
        C: SyncHttpClient,
    {
        self.fetch(USER_POSITIONS_PATH, &[], http_client)?.into_first()
    }

    pub fn user_positions_async<'c, C>(
        &self,
        http_client: &'c C,
    ) -> impl Future<Output = Result<Positions, ApiError<<C as AsyncHttpClient<'c>>::Error>>> + 'c
    where
        C: AsyncHttpClient<'c>,
    {
        let response = self.fetch_async::<Positions, C>(USER_POSITIONS_PATH, &[], http_client);
        Box::pin(async move { response.await?.into_first() })
    }
}
