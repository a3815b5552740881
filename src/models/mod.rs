/// Implements `as_str`, `Display` and `FromStr` for a status enum using
/// its SCREAMING_SNAKE_CASE database label.
macro_rules! status_labels {
    ($ty:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $label,)+
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $ty {
            type Err = crate::error::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_uppercase().as_str() {
                    $($label => Ok(Self::$variant),)+
                    other => Err(crate::error::Error::validation(format!(
                        "unknown {} '{}'",
                        stringify!($ty),
                        other
                    ))),
                }
            }
        }
    };
}

mod approval;
mod client;
mod document;
mod invoice;
mod invoice_line_item;
mod profile;
mod user;

pub use approval::{ClientApproval, ClientValidation};
pub use client::{ApprovalStatus, Client, ClientSummary, NewClient, OnboardingStatus};
pub use document::{Document, DocumentStatus};
pub use invoice::{Invoice, InvoiceStatus, PaymentTerm};
pub use invoice_line_item::{InvoiceLineItem, VatRate};
pub use profile::{NewProfile, Profile};
pub use user::{Role, Session, User, UserRole};
