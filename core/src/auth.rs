//! Pre-authenticated principals.
//!
//! Authentication happens upstream; the core receives a [`Principal`] carrying a
//! role and, for hotel staff, the hotel the account is scoped to.

use crate::error::BookingError;
use crate::types::HotelId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Caller role.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Anonymous or signed-in guest
    Guest,
    /// Hotel staff, scoped to one hotel
    Staff,
    /// Platform administrator
    Admin,
    /// Internal jobs such as the auto-release sweep
    System,
}

impl Role {
    /// Wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Guest => "guest",
            Self::Staff => "staff",
            Self::Admin => "admin",
            Self::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "guest" => Ok(Self::Guest),
            "staff" => Ok(Self::Staff),
            "admin" => Ok(Self::Admin),
            "system" => Ok(Self::System),
            other => Err(BookingError::Authorization(format!("unknown role {other}"))),
        }
    }
}

/// The authenticated caller of an operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Role claim
    pub role: Role,
    /// Hotel claim; only meaningful for [`Role::Staff`]
    pub hotel_id: Option<HotelId>,
}

impl Principal {
    /// An unauthenticated guest.
    #[must_use]
    pub const fn guest() -> Self {
        Self {
            role: Role::Guest,
            hotel_id: None,
        }
    }

    /// Staff of the given hotel.
    #[must_use]
    pub const fn staff(hotel_id: HotelId) -> Self {
        Self {
            role: Role::Staff,
            hotel_id: Some(hotel_id),
        }
    }

    /// A platform administrator.
    #[must_use]
    pub const fn admin() -> Self {
        Self {
            role: Role::Admin,
            hotel_id: None,
        }
    }

    /// Internal system actor.
    #[must_use]
    pub const fn system() -> Self {
        Self {
            role: Role::System,
            hotel_id: None,
        }
    }

    /// Whether the principal is unrestricted across hotels.
    #[must_use]
    pub const fn is_platform(&self) -> bool {
        matches!(self.role, Role::Admin | Role::System)
    }

    /// Check that the principal may perform staff operations on `hotel_id`.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Authorization`] for guests and for staff of
    /// another hotel.
    pub fn authorize_hotel(&self, hotel_id: HotelId) -> Result<(), BookingError> {
        if self.is_platform() {
            return Ok(());
        }
        match self.role {
            Role::Staff if self.hotel_id == Some(hotel_id) => Ok(()),
            Role::Staff => Err(BookingError::Authorization(format!(
                "staff account is not scoped to hotel {hotel_id}"
            ))),
            _ => Err(BookingError::Authorization(
                "staff role required".to_string(),
            )),
        }
    }

    /// The hotel a staff principal is confined to, `None` for platform roles.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Authorization`] for guests and for staff without
    /// a hotel claim.
    pub fn staff_scope(&self) -> Result<Option<HotelId>, BookingError> {
        if self.is_platform() {
            return Ok(None);
        }
        match self.role {
            Role::Staff => self.hotel_id.map(Some).ok_or_else(|| {
                BookingError::Authorization("staff account has no hotel claim".to_string())
            }),
            _ => Err(BookingError::Authorization(
                "staff role required".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staff_is_scoped_to_own_hotel() {
        let home = HotelId::new();
        let other = HotelId::new();
        let staff = Principal::staff(home);

        assert!(staff.authorize_hotel(home).is_ok());
        assert!(matches!(
            staff.authorize_hotel(other),
            Err(BookingError::Authorization(_))
        ));
    }

    #[test]
    fn test_platform_roles_cover_every_hotel() {
        let hotel = HotelId::new();
        assert!(Principal::admin().authorize_hotel(hotel).is_ok());
        assert!(Principal::system().authorize_hotel(hotel).is_ok());
        assert!(Principal::guest().authorize_hotel(hotel).is_err());
        assert!(Principal::system().is_platform());
        assert!(!Principal::staff(hotel).is_platform());
    }

    #[test]
    fn test_staff_without_claim_has_no_scope() {
        let principal = Principal {
            role: Role::Staff,
            hotel_id: None,
        };
        assert!(principal.staff_scope().is_err());
        assert_eq!(Principal::admin().staff_scope(), Ok(None));
    }

    #[test]
    fn test_role_parse_is_case_insensitive() {
        assert_eq!("Staff".parse::<Role>(), Ok(Role::Staff));
        assert!("owner".parse::<Role>().is_err());
    }
}
