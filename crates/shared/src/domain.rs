use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(UserId);
id_newtype!(LeadId);
id_newtype!(ClientId);
id_newtype!(TaskId);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownLabel {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} '{}'", self.kind, self.value)
    }
}

impl std::error::Error for UnknownLabel {}

/// Enums that travel as upper-case labels on the wire and in storage.
macro_rules! label_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $label:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $label)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $label,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownLabel;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($label => Ok($name::$variant),)+
                    other => Err(UnknownLabel {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

label_enum!(Role, "role", {
    Admin => "ADMIN",
    Manager => "MANAGER",
    Employee => "EMPLOYEE",
});

label_enum!(LeadStatus, "lead status", {
    New => "NEW",
    Contacted => "CONTACTED",
    Qualified => "QUALIFIED",
    Lost => "LOST",
    Converted => "CONVERTED",
});

label_enum!(ConversionStatus, "conversion status", {
    Pending => "PENDING",
    Converted => "CONVERTED",
    Denied => "DENIED",
});

label_enum!(ClientStatus, "client status", {
    Active => "ACTIVE",
    Inactive => "INACTIVE",
    OnHold => "ON_HOLD",
    Closed => "CLOSED",
});

label_enum!(TaskStatus, "task status", {
    Todo => "TODO",
    InProgress => "IN_PROGRESS",
    Done => "DONE",
});

label_enum!(TaskPriority, "task priority", {
    Low => "LOW",
    Medium => "MEDIUM",
    High => "HIGH",
    Urgent => "URGENT",
});

impl Default for LeadStatus {
    fn default() -> Self {
        Self::New
    }
}

impl Default for ClientStatus {
    fn default() -> Self {
        Self::Active
    }
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Todo
    }
}

impl Default for TaskPriority {
    fn default() -> Self {
        Self::Medium
    }
}

impl Role {
    pub fn is_manager_or_admin(self) -> bool {
        matches!(self, Role::Manager | Role::Admin)
    }
}
