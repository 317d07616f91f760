//! Role-based access guard.
//!
//! Every capability decision goes through [`AccessGuard`]; callers never
//! compare roles directly.

use super::user::{Role, User, UserId};
use crate::error::BookingError;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    CreateBooking,
    ViewBooking,
    StartPayment,
    CancelBooking,
    ConfirmMobilePayment,
    IssueRefund,
    ManageInventory,
    ViewFinancialReports,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::CreateBooking => "create bookings",
            Operation::ViewBooking => "view bookings",
            Operation::StartPayment => "start payments",
            Operation::CancelBooking => "cancel bookings",
            Operation::ConfirmMobilePayment => "confirm or reject mobile-money payments",
            Operation::IssueRefund => "issue refunds",
            Operation::ManageInventory => "manage room inventory",
            Operation::ViewFinancialReports => "view financial reports",
        };
        f.write_str(name)
    }
}

/// How much of an operation a role is granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Access {
    Denied,
    /// Only on records the actor owns.
    Own,
    /// A reduced view of the operation's result.
    Partial,
    Full,
}

impl Role {
    pub const fn access(self, operation: Operation) -> Access {
        use Access::*;
        use Operation::*;
        match (self, operation) {
            (Role::Administrator, _) => Full,
            (Role::Staff, ManageInventory) => Denied,
            (Role::Staff, ViewFinancialReports) => Partial,
            (Role::Staff, _) => Full,
            (Role::Guest, CreateBooking | ViewBooking | StartPayment | CancelBooking) => Own,
            (Role::Guest, _) => Denied,
        }
    }
}

pub struct AccessGuard;

impl AccessGuard {
    /// Checks the account is active and the role is granted the operation at all.
    pub fn authorize(user: &User, operation: Operation) -> Result<Access, BookingError> {
        if !user.active {
            return Err(BookingError::AccountInactive(user.id));
        }
        match user.role.access(operation) {
            Access::Denied => Err(BookingError::Forbidden {
                role: user.role,
                operation,
            }),
            access => Ok(access),
        }
    }

    /// Like [`AccessGuard::authorize`], additionally enforcing ownership for
    /// roles that only hold [`Access::Own`].
    pub fn authorize_for(
        user: &User,
        operation: Operation,
        owner: UserId,
    ) -> Result<Access, BookingError> {
        let access = Self::authorize(user, operation)?;
        if access == Access::Own && owner != user.id {
            return Err(BookingError::Forbidden {
                role: user.role,
                operation,
            });
        }
        Ok(access)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Role) -> User {
        User::new(UserId(1), "someone", role)
    }

    #[test]
    fn test_capability_table() {
        let guest = user(Role::Guest);
        let staff = user(Role::Staff);
        let admin = user(Role::Administrator);

        assert_eq!(
            AccessGuard::authorize(&guest, Operation::CreateBooking).unwrap(),
            Access::Own
        );
        assert!(matches!(
            AccessGuard::authorize(&guest, Operation::ConfirmMobilePayment),
            Err(BookingError::Forbidden { .. })
        ));
        assert!(AccessGuard::authorize(&guest, Operation::IssueRefund).is_err());
        assert!(AccessGuard::authorize(&guest, Operation::ViewFinancialReports).is_err());

        assert_eq!(
            AccessGuard::authorize(&staff, Operation::ConfirmMobilePayment).unwrap(),
            Access::Full
        );
        assert_eq!(
            AccessGuard::authorize(&staff, Operation::ViewFinancialReports).unwrap(),
            Access::Partial
        );
        assert!(matches!(
            AccessGuard::authorize(&staff, Operation::ManageInventory),
            Err(BookingError::Forbidden { .. })
        ));

        assert_eq!(
            AccessGuard::authorize(&admin, Operation::ManageInventory).unwrap(),
            Access::Full
        );
        assert_eq!(
            AccessGuard::authorize(&admin, Operation::ViewFinancialReports).unwrap(),
            Access::Full
        );
    }

    #[test]
    fn test_guest_restricted_to_own_records() {
        let guest = user(Role::Guest);
        assert!(AccessGuard::authorize_for(&guest, Operation::CancelBooking, UserId(1)).is_ok());
        assert!(matches!(
            AccessGuard::authorize_for(&guest, Operation::CancelBooking, UserId(2)),
            Err(BookingError::Forbidden { .. })
        ));

        let staff = user(Role::Staff);
        assert!(AccessGuard::authorize_for(&staff, Operation::CancelBooking, UserId(2)).is_ok());
    }

    #[test]
    fn test_inactive_account_rejected_regardless_of_role() {
        for role in [Role::Guest, Role::Staff, Role::Administrator] {
            let mut inactive = user(role);
            inactive.active = false;
            assert!(matches!(
                AccessGuard::authorize(&inactive, Operation::ViewBooking),
                Err(BookingError::AccountInactive(UserId(1)))
            ));
        }
    }
}
