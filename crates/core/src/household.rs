use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! id_type {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                $name(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map($name)
            }
        }
    };
}

id_type!(HouseholdId);
id_type!(UserId);
id_type!(MemberId);
id_type!(CategoryId);
id_type!(TransactionId);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub household_id: HouseholdId,
    pub name: String,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub image_url: Option<String>,
    pub sort_order: i32,
}

/// A participant in a household. `user_id` is set once the member has an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub household_id: HouseholdId,
    pub user_id: Option<UserId>,
    pub display_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Expense,
    Income,
    Reimbursement,
    Settlement,
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionType::Expense => write!(f, "expense"),
            TransactionType::Income => write!(f, "income"),
            TransactionType::Reimbursement => write!(f, "reimbursement"),
            TransactionType::Settlement => write!(f, "settlement"),
        }
    }
}

impl std::str::FromStr for TransactionType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "expense" => Ok(TransactionType::Expense),
            "income" => Ok(TransactionType::Income),
            "reimbursement" => Ok(TransactionType::Reimbursement),
            "settlement" => Ok(TransactionType::Settlement),
            other => Err(format!("Unknown transaction type: '{other}'")),
        }
    }
}

/// How a transaction's amount is divided between members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitType {
    #[default]
    Equal,
    Amount,
    Percentage,
    /// The whole amount belongs to one member (`split_member`).
    MemberOnly,
    /// Nobody but the payer is involved.
    PayerOnly,
}

impl fmt::Display for SplitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SplitType::Equal => write!(f, "equal"),
            SplitType::Amount => write!(f, "amount"),
            SplitType::Percentage => write!(f, "percentage"),
            SplitType::MemberOnly => write!(f, "member_only"),
            SplitType::PayerOnly => write!(f, "payer_only"),
        }
    }
}

impl std::str::FromStr for SplitType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "equal" | "equally" => Ok(SplitType::Equal),
            "amount" | "exact" => Ok(SplitType::Amount),
            "percentage" | "percent" => Ok(SplitType::Percentage),
            "member_only" | "member" => Ok(SplitType::MemberOnly),
            "payer_only" | "payer" => Ok(SplitType::PayerOnly),
            other => Err(format!("Unknown split type: '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaidByType {
    #[default]
    Single,
    Multiple,
}

impl fmt::Display for PaidByType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaidByType::Single => write!(f, "single"),
            PaidByType::Multiple => write!(f, "multiple"),
        }
    }
}

impl std::str::FromStr for PaidByType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single" => Ok(PaidByType::Single),
            "multiple" => Ok(PaidByType::Multiple),
            other => Err(format!("Unknown paid-by type: '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_type_parses_case_insensitively() {
        assert_eq!("Expense".parse(), Ok(TransactionType::Expense));
        assert_eq!(" REIMBURSEMENT ".parse(), Ok(TransactionType::Reimbursement));
        assert!("refund".parse::<TransactionType>().is_err());
    }

    #[test]
    fn transaction_type_display_parses_back() {
        for t in [
            TransactionType::Expense,
            TransactionType::Income,
            TransactionType::Reimbursement,
            TransactionType::Settlement,
        ] {
            assert_eq!(t.to_string().parse(), Ok(t));
        }
    }

    #[test]
    fn split_type_accepts_aliases() {
        assert_eq!("Member Only".parse(), Ok(SplitType::MemberOnly));
        assert_eq!("exact".parse(), Ok(SplitType::Amount));
        assert_eq!("payer-only".parse(), Ok(SplitType::PayerOnly));
        assert!("thirds".parse::<SplitType>().is_err());
    }

    #[test]
    fn ids_parse_from_display() {
        let id = MemberId::new();
        assert_eq!(id.to_string().parse::<MemberId>().unwrap(), id);
    }
}
