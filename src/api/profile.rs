use crate::helpers::millis_to_utc;
use crate::{ApiClient, ApiError, AsyncHttpClient, SyncHttpClient, UnknownUserType, UserType};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use std::future::Future;

const PROFILE_PATH: &str = "/v1/me/profile";

/// Profile of the authenticated user.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct Profile {
    pub id: Option<String>,
    pub account: Option<String>,
    pub name: Option<String>,
    pub kind: Option<String>,
    pub code: Option<String>,
    pub user_type: Option<String>,
    pub organize: Option<Organize>,
    pub class_no: Option<String>,
    pub birthday: Option<Birthday>,
    pub gender: Option<String>,
    pub email: Option<String>,
    pub time_zone: Option<i32>,
    pub identities: Option<Vec<Identity>>,
    pub card_no: Option<String>,
    pub card_type: Option<String>,
    pub union_id: Option<String>,
}
impl Profile {
    /// Parses the `userType` tag, if present.
    pub fn parsed_user_type(&self) -> Option<Result<UserType, UnknownUserType>> {
        self.user_type.as_deref().map(str::parse)
    }

    /// Returns the identity flagged as default, if any.
    pub fn default_identity(&self) -> Option<&Identity> {
        self.identities
            .iter()
            .flatten()
            .find(|identity| identity.is_default == Some(true))
    }
}

/// Organization (school, department) a user belongs to.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
#[non_exhaustive]
pub struct Organize {
    pub id: Option<String>,
    pub name: Option<String>,
}

/// Birthday of a user; components are zero-padded strings (e.g., `"01"`).
#[skip_serializing_none]
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct Birthday {
    pub birth_year: Option<String>,
    pub birth_month: Option<String>,
    pub birth_day: Option<String>,
}

/// One of the identities (student enrollment, staff appointment, ...) held by a user.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct Identity {
    pub kind: Option<String>,
    pub is_default: Option<bool>,
    pub code: Option<String>,
    pub user_type: Option<String>,
    pub organize: Option<Organize>,
    pub mgt_organize: Option<Organize>,
    pub status: Option<String>,
    pub expire_date: Option<String>,
    /// Milliseconds since the Unix epoch.
    pub create_date: Option<i64>,
    /// Milliseconds since the Unix epoch.
    pub update_date: Option<i64>,
    pub class_no: Option<String>,
    pub gjm: Option<String>,
    pub major: Option<Major>,
    pub admission_date: Option<String>,
    pub train_level: Option<String>,
    pub graduate_date: Option<String>,
}
impl Identity {
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.create_date.and_then(millis_to_utc)
    }
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.update_date.and_then(millis_to_utc)
    }
}

#[skip_serializing_none]
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
#[non_exhaustive]
pub struct Major {
    pub name: Option<String>,
    pub id: Option<String>,
}

impl ApiClient {
    /// Fetches the profile of the authenticated user (`GET /v1/me/profile`).
    ///
    /// Requires the `essential` scope.
    pub fn profile<C>(&self, http_client: &C) -> Result<Profile, ApiError<<C as SyncHttpClient>::Error>>
    where
        C: SyncHttpClient,
    {
        self.fetch(PROFILE_PATH, &[], http_client)?.into_first()
    }

    /// Asynchronously fetches the profile of the authenticated user.
    pub fn profile_async<'c, C>(
        &self,
        http_client: &'c C,
    ) -> impl Future<Output = Result<Profile, ApiError<<C as AsyncHttpClient<'c>>::Error>>> + 'c
    where
        C: AsyncHttpClient<'c>,
    {
        let response = self.fetch_async::<Profile, C>(PROFILE_PATH, &[], http_client);
        Box::pin(async move { response.await?.into_first() })
    }
}
