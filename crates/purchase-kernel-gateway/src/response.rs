//! Store billing response codes.

use serde::{Deserialize, Serialize};

/// Response code attached to every store answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum ResponseCode {
    ServiceTimeout = -3,
    FeatureNotSupported = -2,
    ServiceDisconnected = -1,
    Ok = 0,
    UserCanceled = 1,
    ServiceUnavailable = 2,
    BillingUnavailable = 3,
    ItemUnavailable = 4,
    DeveloperError = 5,
    Error = 6,
    ItemAlreadyOwned = 7,
    ItemNotOwned = 8,
}

impl ResponseCode {
    /// Convert to the store's numeric code.
    pub fn to_i32(self) -> i32 {
        self as i32
    }

    /// Try to parse the store's numeric code.
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            -3 => Some(Self::ServiceTimeout),
            -2 => Some(Self::FeatureNotSupported),
            -1 => Some(Self::ServiceDisconnected),
            0 => Some(Self::Ok),
            1 => Some(Self::UserCanceled),
            2 => Some(Self::ServiceUnavailable),
            3 => Some(Self::BillingUnavailable),
            4 => Some(Self::ItemUnavailable),
            5 => Some(Self::DeveloperError),
            6 => Some(Self::Error),
            7 => Some(Self::ItemAlreadyOwned),
            8 => Some(Self::ItemNotOwned),
            _ => None,
        }
    }

    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }

    /// Whether retrying the same call may succeed.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            Self::ServiceTimeout | Self::ServiceDisconnected | Self::ServiceUnavailable | Self::Error
        )
    }
}
