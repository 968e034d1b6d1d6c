use base64::prelude::BASE64_URL_SAFE_NO_PAD;
use base64::Engine;
use rand::{thread_rng, Rng};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use std::fmt::{Display, Formatter, Result as FormatterResult};
use std::str::FromStr;


new_type![
    /// Audience claim value: the client identifier the ID token was issued for.
    #[derive(Deserialize, Hash, Ord, PartialOrd, Serialize)]
    Audience(String)
];

new_type![
    /// Institution-specific code of the End-User (e.g., student or staff number).
    #[derive(Deserialize, Hash, Ord, PartialOrd, Serialize)]
    InstitutionCode(String)
];

new_type![
    /// End-User's display name.
    #[derive(Deserialize, Hash, Ord, PartialOrd, Serialize)]
    EndUserName(String)
];

new_type![
    /// Locally unique and never reassigned identifier within the Issuer for the End-User.
    #[derive(Deserialize, Hash, Ord, PartialOrd, Serialize)]
    SubjectIdentifier(String)
];

new_url_type![
    /// Base URL of the jAccount REST API.
    ApiUrl
    impl {
        /// Resolve an absolute endpoint path (e.g., `/v1/me/profile`) against this base URL.
        pub fn join(&self, path: &str) -> Result<Url, url::ParseError> {
            let base = self.1.trim_end_matches('/');
            let path = path.trim_start_matches('/');
            Url::parse(&format!("{}/{}", base, path))
        }
    }
];

new_url_type![
    /// URL that the provider asserts as its Issuer Identifier.
    ///
    /// Comparison against the `iss` claim is an exact string match, so `IssuerUrl` keeps the
    /// string it was created from.
    IssuerUrl
];

/// Fewest random bytes (128 bits) a generated [`Nonce`] carries.
pub const MIN_NONCE_BYTES: u32 = 16;

new_secret_type![
    /// String value used to associate a client session with an ID token, and to mitigate replay
    /// attacks.
    #[derive(Clone, Deserialize, Serialize)]
    Nonce(String)
    impl {
        /// Generate a new random, base64-encoded 128-bit nonce.
        pub fn new_random() -> Self {
            Nonce::new_random_len(MIN_NONCE_BYTES)
        }
        /// Generate a new random, base64-encoded nonce of the specified length.
        ///
        /// Lengths below [`MIN_NONCE_BYTES`] are raised to it.
        ///
        /// # Arguments
        ///
        /// * `num_bytes` - Number of random bytes to generate, prior to base64-encoding.
        pub fn new_random_len(num_bytes: u32) -> Self {
            let num_bytes = num_bytes.max(MIN_NONCE_BYTES);
            let random_bytes: Vec<u8> = (0..num_bytes).map(|_| thread_rng().gen::<u8>()).collect();
            Nonce::new(BASE64_URL_SAFE_NO_PAD.encode(random_bytes))
        }
    }
];

impl From<String> for Nonce {
    fn from(s: String) -> Self {
        Nonce::new(s)
    }
}

// Constant time.
impl PartialEq for Nonce {
    fn eq(&self, other: &Self) -> bool {
        crate::helpers::constant_time_str_eq(self.secret(), other.secret())
    }
}
impl Eq for Nonce {}

/// Error returned when parsing an unrecognized [`UserType`] tag.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("unknown jAccount user type `{0}`")]
pub struct UnknownUserType(pub String);

/// Institutional role of a jAccount End-User, as conveyed by the `type` claim of an ID token and
/// the `userType` field of REST resources.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[non_exhaustive]
pub enum UserType {
    /// Faculty and staff.
    #[serde(rename = "faculty")]
    Faculty,
    /// Student.
    #[serde(rename = "student")]
    Student,
    /// Faculty of the School of Medicine.
    #[serde(rename = "yxy")]
    MedicalSchoolFaculty,
    /// Faculty of an affiliated unit (e.g., an affiliated hospital).
    #[serde(rename = "fsyyjzg")]
    AffiliatedUnitFaculty,
    /// VIP guest.
    #[serde(rename = "vip")]
    Vip,
    /// Postdoctoral researcher.
    #[serde(rename = "postphd")]
    PostPhd,
    /// External teacher.
    #[serde(rename = "external_teacher")]
    ExternalTeacher,
    /// Summer school participant.
    #[serde(rename = "summer")]
    Summer,
    /// Team (shared) account.
    #[serde(rename = "team")]
    Team,
    /// Alumnus.
    #[serde(rename = "alumni")]
    Alumni,
    /// Green channel account.
    #[serde(rename = "green")]
    Green,
    /// External collaborator.
    #[serde(rename = "outside")]
    Outside,
}

impl UserType {
    /// Every known user type, in declaration order.
    pub const ALL: [UserType; 12] = [
        UserType::Faculty,
        UserType::Student,
        UserType::MedicalSchoolFaculty,
        UserType::AffiliatedUnitFaculty,
        UserType::Vip,
        UserType::PostPhd,
        UserType::ExternalTeacher,
        UserType::Summer,
        UserType::Team,
        UserType::Alumni,
        UserType::Green,
        UserType::Outside,
    ];

    /// Returns the wire tag of this user type.
    pub fn as_str(&self) -> &'static str {
        match self {
            UserType::Faculty => "faculty",
            UserType::Student => "student",
            UserType::MedicalSchoolFaculty => "yxy",
            UserType::AffiliatedUnitFaculty => "fsyyjzg",
            UserType::Vip => "vip",
            UserType::PostPhd => "postphd",
            UserType::ExternalTeacher => "external_teacher",
            UserType::Summer => "summer",
            UserType::Team => "team",
            UserType::Alumni => "alumni",
            UserType::Green => "green",
            UserType::Outside => "outside",
        }
    }
}

impl AsRef<str> for UserType {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl Display for UserType {
    fn fmt(&self, f: &mut Formatter) -> FormatterResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserType {
    type Err = UnknownUserType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UserType::ALL
            .iter()
            .find(|user_type| user_type.as_str() == s)
            .copied()
            .ok_or_else(|| UnknownUserType(s.to_string()))
    }
}
