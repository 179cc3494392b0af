//! Filter expression types for application queries.
//!
//! A query carries an optional tree of predicate groups: each group holds
//! field comparisons and nested groups joined by a single AND/OR combinator.
//! These types map one-to-one onto the JSON wire format.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::record::is_column;
use crate::{AppError, Result};

/// Comparison operator of a single predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Operator {
    /// `=`
    Equals,
    /// `!=`
    NotEquals,
    /// `<`
    LessThan,
    /// `>`
    GreaterThan,
    /// `<=`
    LessEqual,
    /// `>=`
    GreaterEqual,
    /// Substring match: CONTAINS
    Contains,
    /// Negated substring match: NOT_CONTAINS
    NotContains,
    /// Null check: IS_EMPTY
    IsEmpty,
    /// Non-null check: IS_NOT_EMPTY
    IsNotEmpty,
    /// Raw SQL LIKE pattern: LIKE
    Like,
}

impl Operator {
    /// Wire spelling of the operator.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Equals => "=",
            Operator::NotEquals => "!=",
            Operator::LessThan => "<",
            Operator::GreaterThan => ">",
            Operator::LessEqual => "<=",
            Operator::GreaterEqual => ">=",
            Operator::Contains => "CONTAINS",
            Operator::NotContains => "NOT_CONTAINS",
            Operator::IsEmpty => "IS_EMPTY",
            Operator::IsNotEmpty => "IS_NOT_EMPTY",
            Operator::Like => "LIKE",
        }
    }

    /// The six comparisons that accept an unquoted numeric operand.
    pub fn is_numeric_comparison(&self) -> bool {
        matches!(
            self,
            Operator::Equals
                | Operator::NotEquals
                | Operator::LessThan
                | Operator::GreaterThan
                | Operator::LessEqual
                | Operator::GreaterEqual
        )
    }

    /// Null checks take no value.
    pub fn is_null_check(&self) -> bool {
        matches!(self, Operator::IsEmpty | Operator::IsNotEmpty)
    }
}

impl FromStr for Operator {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let op = match s.trim().to_ascii_uppercase().as_str() {
            "=" => Operator::Equals,
            "!=" => Operator::NotEquals,
            "<" => Operator::LessThan,
            ">" => Operator::GreaterThan,
            "<=" => Operator::LessEqual,
            ">=" => Operator::GreaterEqual,
            "CONTAINS" => Operator::Contains,
            "NOT_CONTAINS" => Operator::NotContains,
            "IS_EMPTY" => Operator::IsEmpty,
            "IS_NOT_EMPTY" => Operator::IsNotEmpty,
            "LIKE" => Operator::Like,
            "" => return Err(AppError::Validation("filter operator is required".into())),
            other => {
                return Err(AppError::Validation(format!(
                    "unknown filter operator: {}",
                    other
                )))
            }
        };
        Ok(op)
    }
}

impl TryFrom<String> for Operator {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Operator> for String {
    fn from(op: Operator) -> Self {
        op.as_str().to_string()
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single field comparison: `field operator value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    pub field: String,
    pub operator: Operator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl Predicate {
    pub fn new(field: &str, operator: Operator, value: &str) -> Self {
        Self {
            field: field.to_string(),
            operator,
            value: Some(value.to_string()),
        }
    }

    /// A null check (`IS_EMPTY` / `IS_NOT_EMPTY`), which carries no value.
    pub fn null_check(field: &str, operator: Operator) -> Self {
        Self {
            field: field.to_string(),
            operator,
            value: None,
        }
    }

    /// Check required fields and that the field names a known column.
    pub fn validate(&self) -> Result<()> {
        if self.field.is_empty() {
            return Err(AppError::Validation("filter field is required".into()));
        }
        if !is_column(&self.field) {
            return Err(AppError::Validation(format!(
                "unknown filter field: {}",
                self.field
            )));
        }
        if self.value.is_none() && !self.operator.is_null_check() {
            return Err(AppError::Validation(format!(
                "filter on {} with operator {} requires a value",
                self.field, self.operator
            )));
        }
        Ok(())
    }

    /// Value as written, empty for null checks.
    pub fn value_str(&self) -> &str {
        self.value.as_deref().unwrap_or("")
    }
}

/// Boolean combinator applied uniformly inside a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Combinator {
    #[default]
    #[serde(rename = "AND", alias = "and")]
    And,
    #[serde(rename = "OR", alias = "or")]
    Or,
}

impl Combinator {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Combinator::And => "AND",
            Combinator::Or => "OR",
        }
    }
}

/// Predicates and nested groups joined by one combinator.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PredicateGroup {
    #[serde(default)]
    pub filters: Vec<Predicate>,
    #[serde(default)]
    pub subgroups: Vec<PredicateGroup>,
    #[serde(default)]
    pub operator: Combinator,
}

impl PredicateGroup {
    pub fn new(combinator: Combinator) -> Self {
        Self {
            operator: combinator,
            ..Default::default()
        }
    }

    pub fn with_filter(mut self, predicate: Predicate) -> Self {
        self.filters.push(predicate);
        self
    }

    pub fn with_subgroup(mut self, group: PredicateGroup) -> Self {
        self.subgroups.push(group);
        self
    }

    /// Visit every predicate depth-first: own predicates, then subgroups in order.
    pub fn walk<F>(&self, visit: &mut F) -> Result<()>
    where
        F: FnMut(&Predicate) -> Result<()>,
    {
        for predicate in &self.filters {
            visit(predicate)?;
        }
        for group in &self.subgroups {
            group.walk(visit)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.walk(&mut |p: &Predicate| p.validate())
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[serde(alias = "ASC")]
    Asc,
    #[serde(alias = "DESC")]
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Root of a read request.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FilterQuery {
    #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<PredicateGroup>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<SortOrder>,
    /// Page size; ignored unless positive
    #[serde(default)]
    pub limit: i64,
    /// 1-based page number; ignored unless positive and a limit is set
    #[serde(default)]
    pub page: i64,
}

impl FilterQuery {
    pub fn validate(&self) -> Result<()> {
        if let Some(group) = &self.filter {
            group.validate()?;
        }
        if let Some(sort_by) = &self.sort_by {
            if !sort_by.is_empty() && !is_column(sort_by) {
                return Err(AppError::Validation(format!(
                    "unknown sort field: {}",
                    sort_by
                )));
            }
        }
        Ok(())
    }
}
