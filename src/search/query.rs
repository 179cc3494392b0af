//! SQL query builder for filter queries.
//!
//! Converts a FilterQuery into a SELECT over the application table.
//! [`compile`] produces a parameterized statement with `?` placeholders and
//! is what the record store executes. [`render_literal`] renders the same
//! tree with values inlined, for logging only.

use crate::record::{COLUMNS, DEFAULT_SORT_COLUMN, TABLE};
use crate::{AppError, Result};

use super::filters::*;

/// SQL parameter value for prepared statements.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    /// Text parameter (strings, patterns)
    Text(String),
    /// Integer parameter (numeric values, limit, offset)
    Integer(i64),
    /// Floating point parameter (non-integral numeric values)
    Real(f64),
}

impl rusqlite::ToSql for SqlParam {
    fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
        match self {
            SqlParam::Text(s) => s.to_sql(),
            SqlParam::Integer(i) => i.to_sql(),
            SqlParam::Real(r) => r.to_sql(),
        }
    }
}

/// A compiled statement and its parameters, in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

/// Numeric reading of a predicate value.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Number {
    Integer(i64),
    Real(f64),
}

fn parse_number(value: &str) -> Option<Number> {
    if let Ok(i) = value.parse::<i64>() {
        return Some(Number::Integer(i));
    }
    match value.parse::<f64>() {
        Ok(r) if r.is_finite() => Some(Number::Real(r)),
        _ => None,
    }
}

/// Destination of predicate values: inlined text or bound parameters.
trait ValueSink {
    /// A quoted string operand.
    fn text(&mut self, value: &str) -> String;
    /// An unquoted numeric operand.
    fn number(&mut self, raw: &str, number: Number) -> String;
    /// A substring pattern operand for LIKE / NOT LIKE.
    fn substring(&mut self, value: &str) -> String;
    /// Limit and offset operands.
    fn count(&mut self, n: i64) -> String;
}

/// Inlines values as SQL literals.
struct Literal;

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

impl ValueSink for Literal {
    fn text(&mut self, value: &str) -> String {
        quote(value)
    }

    fn number(&mut self, raw: &str, _number: Number) -> String {
        raw.to_string()
    }

    fn substring(&mut self, value: &str) -> String {
        quote(&format!("%{}%", value))
    }

    fn count(&mut self, n: i64) -> String {
        n.to_string()
    }
}

/// Collects values as bound parameters.
#[derive(Default)]
struct Bound {
    params: Vec<SqlParam>,
}

impl ValueSink for Bound {
    fn text(&mut self, value: &str) -> String {
        self.params.push(SqlParam::Text(value.to_string()));
        "?".to_string()
    }

    fn number(&mut self, _raw: &str, number: Number) -> String {
        self.params.push(match number {
            Number::Integer(i) => SqlParam::Integer(i),
            Number::Real(r) => SqlParam::Real(r),
        });
        "?".to_string()
    }

    fn substring(&mut self, value: &str) -> String {
        self.params
            .push(SqlParam::Text(format!("%{}%", escape_like(value))));
        "? ESCAPE '\\'".to_string()
    }

    fn count(&mut self, n: i64) -> String {
        self.params.push(SqlParam::Integer(n));
        "?".to_string()
    }
}

/// Escape LIKE metacharacters so the value matches literally.
///
/// - `%`, `_`, `\` in input are escaped with `\`
fn escape_like(value: &str) -> String {
    let mut result = String::with_capacity(value.len() + 2);
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            result.push('\\');
        }
        result.push(c);
    }
    result
}

fn render_predicate(p: &Predicate, sink: &mut dyn ValueSink) -> Result<String> {
    p.validate()?;
    let field = p.field.as_str();
    let value = p.value_str();

    match p.operator {
        Operator::Contains => return Ok(format!("{} LIKE {}", field, sink.substring(value))),
        Operator::NotContains => {
            return Ok(format!("{} NOT LIKE {}", field, sink.substring(value)))
        }
        Operator::IsEmpty => return Ok(format!("{} IS NULL", field)),
        Operator::IsNotEmpty => return Ok(format!("{} IS NOT NULL", field)),
        _ => {}
    }

    let op = p.operator.as_str();
    match parse_number(value) {
        None => Ok(format!("{} {} {}", field, op, sink.text(value))),
        Some(number) if p.operator.is_numeric_comparison() => {
            Ok(format!("{} {} {}", field, op, sink.number(value, number)))
        }
        Some(_) => Err(AppError::Compiler(format!(
            "invalid filter: {} for {} with value {}",
            op, field, value
        ))),
    }
}

fn render_group(group: &PredicateGroup, sink: &mut dyn ValueSink) -> Result<String> {
    let mut parts: Vec<String> = Vec::with_capacity(group.filters.len() + group.subgroups.len());

    for predicate in &group.filters {
        parts.push(render_predicate(predicate, sink)?);
    }

    for subgroup in &group.subgroups {
        let rendered = render_group(subgroup, sink)?;
        if !rendered.is_empty() {
            parts.push(format!("({})", rendered));
        }
    }

    Ok(parts.join(&format!(" {} ", group.operator.as_sql())))
}

fn build(query: &FilterQuery, sink: &mut dyn ValueSink) -> Result<String> {
    query.validate()?;

    let mut sql = format!("SELECT {} FROM {}", COLUMNS.join(", "), TABLE);

    if let Some(group) = &query.filter {
        let where_clause = render_group(group, sink)?;
        if !where_clause.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_clause);
        }
    }

    match query.sort_by.as_deref() {
        Some(column) if !column.is_empty() => {
            let order = query.sort_order.unwrap_or(SortOrder::Asc);
            sql.push_str(&format!(" ORDER BY {} {}", column, order.as_sql()));
        }
        _ => sql.push_str(&format!(" ORDER BY {} DESC", DEFAULT_SORT_COLUMN)),
    }

    if query.limit > 0 {
        sql.push_str(&format!(" LIMIT {}", sink.count(query.limit)));
        if query.page > 0 {
            let offset = (query.page - 1).saturating_mul(query.limit);
            sql.push_str(&format!(" OFFSET {}", sink.count(offset)));
        }
    }

    Ok(sql)
}

/// Build the parameterized SELECT for a query.
///
/// # Examples
///
/// ```
/// use jobapps::search::{compile, Combinator, FilterQuery, Operator, Predicate, PredicateGroup, SqlParam};
///
/// let query = FilterQuery {
///     filter: Some(PredicateGroup::new(Combinator::And)
///         .with_filter(Predicate::new("company", Operator::Equals, "Acme"))),
///     ..Default::default()
/// };
/// let compiled = compile(&query).unwrap();
/// assert!(compiled.sql.contains("WHERE company = ?"));
/// assert_eq!(compiled.params, vec![SqlParam::Text("Acme".to_string())]);
/// ```
pub fn compile(query: &FilterQuery) -> Result<CompiledQuery> {
    let mut sink = Bound::default();
    let sql = build(query, &mut sink)?;
    Ok(CompiledQuery {
        sql,
        params: sink.params,
    })
}

/// Build the SELECT for a query with every value inlined as a literal.
pub fn render_literal(query: &FilterQuery) -> Result<String> {
    build(query, &mut Literal)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// WHERE condition of a group with values inlined; empty groups render to "".
    fn render_group_literal(group: &PredicateGroup) -> Result<String> {
        render_group(group, &mut Literal)
    }

    fn eq(field: &str, value: &str) -> Predicate {
        Predicate::new(field, Operator::Equals, value)
    }

    fn with_filter(group: PredicateGroup) -> FilterQuery {
        FilterQuery {
            filter: Some(group),
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_group_renders_empty() {
        assert_eq!(render_group_literal(&PredicateGroup::default()).unwrap(), "");

        let nested = PredicateGroup::new(Combinator::Or)
            .with_subgroup(PredicateGroup::new(Combinator::And))
            .with_subgroup(PredicateGroup::new(Combinator::Or));
        assert_eq!(render_group_literal(&nested).unwrap(), "");
    }

    #[test]
    fn test_empty_root_emits_no_where() {
        let sql = render_literal(&with_filter(PredicateGroup::default())).unwrap();
        assert!(!sql.contains("WHERE"));
        assert!(sql.ends_with("FROM job_application ORDER BY date_applied DESC"));
    }

    #[test]
    fn test_sibling_predicates_single_combinator() {
        let group = PredicateGroup::new(Combinator::And)
            .with_filter(eq("title", "1"))
            .with_filter(eq("company", "2"));

        let rendered = render_group_literal(&group).unwrap();
        assert_eq!(rendered, "title = 1 AND company = 2");
        assert_eq!(rendered.matches("AND").count(), 1);
        assert!(!rendered.contains('('));
    }

    #[test]
    fn test_subgroup_parenthesized() {
        let group = PredicateGroup::new(Combinator::Or)
            .with_filter(eq("source", "linkedin"))
            .with_subgroup(
                PredicateGroup::new(Combinator::Or)
                    .with_filter(eq("company", "Acme"))
                    .with_filter(eq("company", "Globex")),
            );

        assert_eq!(
            render_group_literal(&group).unwrap(),
            "source = 'linkedin' OR (company = 'Acme' OR company = 'Globex')"
        );
    }

    #[test]
    fn test_empty_subgroup_contributes_nothing() {
        let group = PredicateGroup::new(Combinator::And)
            .with_filter(eq("source", "linkedin"))
            .with_subgroup(PredicateGroup::new(Combinator::Or));

        assert_eq!(render_group_literal(&group).unwrap(), "source = 'linkedin'");
    }

    #[test]
    fn test_subgroups_without_predicates() {
        let group = PredicateGroup::new(Combinator::And)
            .with_subgroup(PredicateGroup::new(Combinator::Or).with_filter(eq("title", "a")))
            .with_subgroup(PredicateGroup::new(Combinator::Or).with_filter(eq("title", "b")));

        assert_eq!(
            render_group_literal(&group).unwrap(),
            "(title = 'a') AND (title = 'b')"
        );
    }

    #[test]
    fn test_contains_always_quoted() {
        let group = PredicateGroup::new(Combinator::And)
            .with_filter(Predicate::new("title", Operator::Contains, "42"))
            .with_filter(Predicate::new("company", Operator::NotContains, "Acme"));

        assert_eq!(
            render_group_literal(&group).unwrap(),
            "title LIKE '%42%' AND company NOT LIKE '%Acme%'"
        );
    }

    #[test]
    fn test_null_checks() {
        let group = PredicateGroup::new(Combinator::Or)
            .with_filter(Predicate::null_check("url", Operator::IsEmpty))
            .with_filter(Predicate::null_check("location", Operator::IsNotEmpty));

        assert_eq!(
            render_group_literal(&group).unwrap(),
            "url IS NULL OR location IS NOT NULL"
        );
    }

    #[test]
    fn test_non_numeric_value_quoted_for_numeric_operator() {
        let group = PredicateGroup::new(Combinator::And)
            .with_filter(Predicate::new("date_applied", Operator::GreaterEqual, "2024-01-01"));
        assert_eq!(
            render_group_literal(&group).unwrap(),
            "date_applied >= '2024-01-01'"
        );
    }

    #[test]
    fn test_numeric_value_unquoted_for_numeric_operator() {
        let group = PredicateGroup::new(Combinator::And)
            .with_filter(Predicate::new("reposted", Operator::NotEquals, "0"))
            .with_filter(Predicate::new("internal_id", Operator::LessThan, "2.5"));
        assert_eq!(
            render_group_literal(&group).unwrap(),
            "reposted != 0 AND internal_id < 2.5"
        );
    }

    #[test]
    fn test_like_with_numeric_value_is_compiler_fault() {
        let group = PredicateGroup::new(Combinator::And)
            .with_filter(Predicate::new("internal_id", Operator::Like, "42"));
        assert!(matches!(
            render_group_literal(&group),
            Err(AppError::Compiler(_))
        ));

        let pattern = PredicateGroup::new(Combinator::And)
            .with_filter(Predicate::new("title", Operator::Like, "Senior%"));
        assert_eq!(render_group_literal(&pattern).unwrap(), "title LIKE 'Senior%'");
    }

    #[test]
    fn test_pagination() {
        let query = FilterQuery {
            limit: 10,
            page: 2,
            ..Default::default()
        };
        let sql = render_literal(&query).unwrap();
        assert!(sql.ends_with("ORDER BY date_applied DESC LIMIT 10 OFFSET 10"));

        let first_page = FilterQuery {
            limit: 10,
            ..Default::default()
        };
        let sql = render_literal(&first_page).unwrap();
        assert!(sql.ends_with("LIMIT 10"));
        assert!(!sql.contains("OFFSET"));

        let no_limit = FilterQuery {
            page: 2,
            ..Default::default()
        };
        let sql = render_literal(&no_limit).unwrap();
        assert!(!sql.contains("LIMIT"));
        assert!(!sql.contains("OFFSET"));
    }

    #[test]
    fn test_explicit_sort() {
        let query = FilterQuery {
            sort_by: Some("company".into()),
            sort_order: Some(SortOrder::Desc),
            ..Default::default()
        };
        assert!(render_literal(&query).unwrap().ends_with("ORDER BY company DESC"));

        let ascending = FilterQuery {
            sort_by: Some("title".into()),
            ..Default::default()
        };
        assert!(render_literal(&ascending).unwrap().ends_with("ORDER BY title ASC"));
    }

    #[test]
    fn test_bound_params_in_order() {
        let query = FilterQuery {
            filter: Some(
                PredicateGroup::new(Combinator::And)
                    .with_filter(Predicate::new("company", Operator::Contains, "100%"))
                    .with_filter(eq("reposted", "1"))
                    .with_subgroup(
                        PredicateGroup::new(Combinator::Or)
                            .with_filter(eq("source", "indeed"))
                            .with_filter(Predicate::null_check("url", Operator::IsEmpty)),
                    ),
            ),
            limit: 5,
            page: 3,
            ..Default::default()
        };

        let compiled = compile(&query).unwrap();
        assert!(compiled.sql.contains(
            "WHERE company LIKE ? ESCAPE '\\' AND reposted = ? AND (source = ? OR url IS NULL)"
        ));
        assert!(compiled.sql.ends_with("LIMIT ? OFFSET ?"));
        assert_eq!(
            compiled.params,
            vec![
                SqlParam::Text("%100\\%%".to_string()),
                SqlParam::Integer(1),
                SqlParam::Text("indeed".to_string()),
                SqlParam::Integer(5),
                SqlParam::Integer(10),
            ]
        );
    }

    #[test]
    fn test_sql_injection_prevention() {
        let query = with_filter(
            PredicateGroup::new(Combinator::And)
                .with_filter(eq("title", "'; DROP TABLE job_application; --")),
        );
        let compiled = compile(&query).unwrap();

        assert!(compiled.sql.contains("title = ?"));
        assert!(!compiled.sql.contains("DROP TABLE"));
        assert_eq!(
            compiled.params[0],
            SqlParam::Text("'; DROP TABLE job_application; --".to_string())
        );

        // Literal rendering doubles embedded quotes
        let literal = render_literal(&query).unwrap();
        assert!(literal.contains("title = '''; DROP TABLE job_application; --'"));
    }

    #[test]
    fn test_validation_runs_before_rendering() {
        let query = with_filter(
            PredicateGroup::new(Combinator::And).with_filter(eq("salary", "100")),
        );
        assert!(matches!(compile(&query), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("plain"), "plain");
        assert_eq!(escape_like("100%"), "100\\%");
        assert_eq!(escape_like("file_name"), "file\\_name");
        assert_eq!(escape_like("a\\b"), "a\\\\b");
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("42"), Some(Number::Integer(42)));
        assert_eq!(parse_number("-1.5"), Some(Number::Real(-1.5)));
        assert_eq!(parse_number("inf"), None);
        assert_eq!(parse_number("NaN"), None);
        assert_eq!(parse_number("Acme"), None);
    }
}
