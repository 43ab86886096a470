//! Closed enumerations stored as lowercase text columns.

use std::fmt;
use std::io::Write;
use std::str::FromStr;

use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::pg::{Pg, PgValue};
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind} value: {value:?}")]
pub struct ParseChoiceError {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! text_choice {
    (
        $(#[$meta:meta])*
        $name:ident ($kind:literal) default $default:ident {
            $($variant:ident => $value:literal, $label:literal;)+
        }
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
            Serialize, Deserialize, AsExpression, FromSqlRow,
        )]
        #[diesel(sql_type = Text)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($variant,)+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant,)+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $value,)+
                }
            }

            /// Human-facing label for admin listings.
            pub fn label(&self) -> &'static str {
                match self {
                    $($name::$variant => $label,)+
                }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                $name::$default
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseChoiceError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($value => Ok($name::$variant),)+
                    other => Err(ParseChoiceError {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl ToSql<Text, Pg> for $name {
            fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
                out.write_all(self.as_str().as_bytes())?;
                Ok(IsNull::No)
            }
        }

        impl FromSql<Text, Pg> for $name {
            fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
                let raw = <String as FromSql<Text, Pg>>::from_sql(bytes)?;
                Ok(raw.parse()?)
            }
        }
    };
}

text_choice! {
    /// Priority level. The storage layer rejects anything else.
    Priority("priority") default Medium {
        Low => "low", "Low";
        Medium => "medium", "Medium";
        High => "high", "High";
    }
}

text_choice! {
    /// Who a notification is meant for.
    Scope("scope") default User {
        Global => "global", "Global";
        User => "user", "User-Specific";
        Admin => "admin", "Admin-Only";
    }
}

text_choice! {
    Severity("severity") default Info {
        Success => "success", "Success";
        Info => "info", "Info";
        Warning => "warning", "Warning";
        Error => "error", "Error";
    }
}

text_choice! {
    DeliveryMethod("delivery method") default Web {
        Email => "email", "Email";
        Push => "push", "Push Notification";
        Sms => "sms", "SMS";
        Web => "web", "Web Notification";
    }
}

impl Severity {
    /// Warning and error notifications need attention.
    pub fn is_critical(&self) -> bool {
        matches!(self, Severity::Warning | Severity::Error)
    }
}
