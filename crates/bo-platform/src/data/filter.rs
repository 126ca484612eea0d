//! Typed filter expressions
//!
//! Filters are built from [`Column`] references declared next to each entity
//! and render to a parameterized `WHERE` clause: column names come from
//! `&'static str` constants and every value is a bound parameter. The same
//! tree is evaluated in memory (with SQL's three-valued logic) by the
//! in-memory repository.

use std::cmp::Ordering;
use std::marker::PhantomData;

use super::entity::{Entity, EntityKey, ID_COLUMN, IS_DELETED_COLUMN};
use super::value::SqlValue;

/// Typed reference to a column of entity `E` holding values of type `T`
pub struct Column<E, T> {
    name: &'static str,
    _marker: PhantomData<fn() -> (E, T)>,
}

impl<E, T> Clone for Column<E, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E, T> Copy for Column<E, T> {}

impl<E, T> std::fmt::Debug for Column<E, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Column").field(&self.name).finish()
    }
}

impl<E, T> Column<E, T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_null(&self) -> Filter<E> {
        Filter::from_expr(Expr::Null { column: self.name, negated: false })
    }

    pub fn is_not_null(&self) -> Filter<E> {
        Filter::from_expr(Expr::Null { column: self.name, negated: true })
    }
}

impl<E, T: Into<SqlValue>> Column<E, T> {
    fn compare(&self, op: CompareOp, value: impl Into<T>) -> Filter<E> {
        let value: T = value.into();
        Filter::from_expr(Expr::Compare {
            column: self.name,
            op,
            value: value.into(),
        })
    }

    pub fn eq(&self, value: impl Into<T>) -> Filter<E> {
        self.compare(CompareOp::Eq, value)
    }

    pub fn ne(&self, value: impl Into<T>) -> Filter<E> {
        self.compare(CompareOp::Ne, value)
    }

    pub fn gt(&self, value: impl Into<T>) -> Filter<E> {
        self.compare(CompareOp::Gt, value)
    }

    pub fn gte(&self, value: impl Into<T>) -> Filter<E> {
        self.compare(CompareOp::Gte, value)
    }

    pub fn lt(&self, value: impl Into<T>) -> Filter<E> {
        self.compare(CompareOp::Lt, value)
    }

    pub fn lte(&self, value: impl Into<T>) -> Filter<E> {
        self.compare(CompareOp::Lte, value)
    }

    pub fn is_in<I, V>(&self, values: I) -> Filter<E>
    where
        I: IntoIterator<Item = V>,
        V: Into<T>,
    {
        let values = values
            .into_iter()
            .map(|v| {
                let v: T = v.into();
                v.into()
            })
            .collect();
        Filter::from_expr(Expr::In { column: self.name, values })
    }
}

/// Column types that support pattern matching
pub trait TextColumn {}

impl TextColumn for String {}
impl TextColumn for Option<String> {}

impl<E, T: TextColumn> Column<E, T> {
    pub fn starts_with(&self, prefix: impl Into<String>) -> Filter<E> {
        Filter::from_expr(Expr::Like {
            column: self.name,
            kind: LikeKind::Prefix,
            text: prefix.into(),
        })
    }

    pub fn contains(&self, text: impl Into<String>) -> Filter<E> {
        Filter::from_expr(Expr::Like {
            column: self.name,
            kind: LikeKind::Contains,
            text: text.into(),
        })
    }

    /// Equality after lower-casing both sides
    pub fn eq_ignore_case(&self, text: impl Into<String>) -> Filter<E> {
        Filter::from_expr(Expr::EqIgnoreCase {
            column: self.name,
            text: text.into(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompareOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CompareOp {
    fn sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
        }
    }

    fn test(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::Ne => ordering != Ordering::Equal,
            Self::Gt => ordering == Ordering::Greater,
            Self::Gte => ordering != Ordering::Less,
            Self::Lt => ordering == Ordering::Less,
            Self::Lte => ordering != Ordering::Greater,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LikeKind {
    Prefix,
    Contains,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    True,
    Compare { column: &'static str, op: CompareOp, value: SqlValue },
    In { column: &'static str, values: Vec<SqlValue> },
    Null { column: &'static str, negated: bool },
    Like { column: &'static str, kind: LikeKind, text: String },
    EqIgnoreCase { column: &'static str, text: String },
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
}

/// A boolean predicate over entity `E`
pub struct Filter<E> {
    expr: Expr,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for Filter<E> {
    fn clone(&self) -> Self {
        Self::from_expr(self.expr.clone())
    }
}

impl<E> std::fmt::Debug for Filter<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.expr.fmt(f)
    }
}

impl<E> Filter<E> {
    fn from_expr(expr: Expr) -> Self {
        Self {
            expr,
            _entity: PhantomData,
        }
    }

    /// Matches every row
    pub fn all() -> Self {
        Self::from_expr(Expr::True)
    }

    /// Rows not flagged as soft-deleted
    pub fn not_deleted() -> Self {
        Self::from_expr(Expr::Compare {
            column: IS_DELETED_COLUMN,
            op: CompareOp::Eq,
            value: SqlValue::Bool(Some(false)),
        })
    }

    pub fn and(self, other: Filter<E>) -> Self {
        let exprs = match (self.expr, other.expr) {
            (Expr::True, e) | (e, Expr::True) => return Self::from_expr(e),
            (Expr::And(mut left), Expr::And(right)) => {
                left.extend(right);
                left
            }
            (Expr::And(mut left), e) => {
                left.push(e);
                left
            }
            (e, Expr::And(mut right)) => {
                right.insert(0, e);
                right
            }
            (l, r) => vec![l, r],
        };
        Self::from_expr(Expr::And(exprs))
    }

    pub fn or(self, other: Filter<E>) -> Self {
        let exprs = match (self.expr, other.expr) {
            (Expr::Or(mut left), Expr::Or(right)) => {
                left.extend(right);
                left
            }
            (Expr::Or(mut left), e) => {
                left.push(e);
                left
            }
            (l, r) => vec![l, r],
        };
        Self::from_expr(Expr::Or(exprs))
    }

    /// Render as a SQL boolean expression, appending bound values to `params`.
    ///
    /// Placeholders continue numbering from the values already in `params`.
    pub fn to_sql(&self, params: &mut Vec<SqlValue>) -> String {
        render(&self.expr, params)
    }
}

impl<E: Entity> Filter<E> {
    pub fn id_eq(id: &E::Key) -> Self {
        Self::from_expr(Expr::Compare {
            column: ID_COLUMN,
            op: CompareOp::Eq,
            value: id.to_sql(),
        })
    }

    pub fn id_gt(id: &E::Key) -> Self {
        Self::from_expr(Expr::Compare {
            column: ID_COLUMN,
            op: CompareOp::Gt,
            value: id.to_sql(),
        })
    }

    /// Whether `entity` satisfies the filter; unknown counts as no match
    pub fn matches(&self, entity: &E) -> bool {
        eval(&self.expr, entity) == Some(true)
    }
}

impl<E> std::ops::Not for Filter<E> {
    type Output = Filter<E>;

    fn not(self) -> Self::Output {
        match self.expr {
            Expr::Not(inner) => Self::from_expr(*inner),
            expr => Self::from_expr(Expr::Not(Box::new(expr))),
        }
    }
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn escape_like(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn push_param(params: &mut Vec<SqlValue>, value: SqlValue) -> String {
    params.push(value);
    format!("${}", params.len())
}

fn render(expr: &Expr, params: &mut Vec<SqlValue>) -> String {
    match expr {
        Expr::True => "TRUE".to_string(),
        Expr::Compare { column, op, value } if value.is_null() => match op {
            CompareOp::Eq => format!("{} IS NULL", quote_ident(column)),
            CompareOp::Ne => format!("{} IS NOT NULL", quote_ident(column)),
            // ordering against NULL is never true
            _ => "FALSE".to_string(),
        },
        Expr::Compare { column, op, value } => {
            let placeholder = push_param(params, value.clone());
            format!("{} {} {}", quote_ident(column), op.sql(), placeholder)
        }
        Expr::In { values, .. } if values.is_empty() => "FALSE".to_string(),
        Expr::In { column, values } => {
            let placeholders: Vec<String> = values
                .iter()
                .map(|v| push_param(params, v.clone()))
                .collect();
            format!("{} IN ({})", quote_ident(column), placeholders.join(", "))
        }
        Expr::Null { column, negated } => {
            let not = if *negated { " NOT" } else { "" };
            format!("{} IS{} NULL", quote_ident(column), not)
        }
        Expr::Like { column, kind, text } => {
            let pattern = match kind {
                LikeKind::Prefix => format!("{}%", escape_like(text)),
                LikeKind::Contains => format!("%{}%", escape_like(text)),
            };
            let placeholder = push_param(params, SqlValue::Text(Some(pattern)));
            format!("{} LIKE {}", quote_ident(column), placeholder)
        }
        Expr::EqIgnoreCase { column, text } => {
            let placeholder = push_param(params, SqlValue::Text(Some(text.clone())));
            format!("LOWER({}) = LOWER({})", quote_ident(column), placeholder)
        }
        Expr::And(exprs) if exprs.is_empty() => "TRUE".to_string(),
        Expr::Or(exprs) if exprs.is_empty() => "FALSE".to_string(),
        Expr::And(exprs) => join(exprs, " AND ", params),
        Expr::Or(exprs) => join(exprs, " OR ", params),
        Expr::Not(inner) => format!("NOT ({})", render(inner, params)),
    }
}

fn join(exprs: &[Expr], separator: &str, params: &mut Vec<SqlValue>) -> String {
    let parts: Vec<String> = exprs.iter().map(|e| render(e, params)).collect();
    format!("({})", parts.join(separator))
}

fn eval<E: Entity>(expr: &Expr, entity: &E) -> Option<bool> {
    match expr {
        Expr::True => Some(true),
        Expr::Compare { column, op, value } => {
            let field = entity.field(column)?;
            match op {
                CompareOp::Eq if value.is_null() => Some(field.is_null()),
                CompareOp::Ne if value.is_null() => Some(!field.is_null()),
                _ => field.compare(value).map(|ordering| op.test(ordering)),
            }
        }
        Expr::In { column, values } => {
            let field = entity.field(column)?;
            if field.is_null() {
                return None;
            }
            let mut unknown = false;
            for value in values {
                match field.compare(value) {
                    Some(Ordering::Equal) => return Some(true),
                    Some(_) => {}
                    None => unknown = true,
                }
            }
            if unknown {
                None
            } else {
                Some(false)
            }
        }
        Expr::Null { column, negated } => {
            let is_null = entity.field(column).map_or(true, |f| f.is_null());
            Some(is_null != *negated)
        }
        Expr::Like { column, kind, text } => {
            let field = entity.field(column)?;
            let value = field.as_text()?;
            Some(match kind {
                LikeKind::Prefix => value.starts_with(text.as_str()),
                LikeKind::Contains => value.contains(text.as_str()),
            })
        }
        Expr::EqIgnoreCase { column, text } => {
            let field = entity.field(column)?;
            let value = field.as_text()?;
            Some(value.to_lowercase() == text.to_lowercase())
        }
        Expr::And(exprs) => {
            let mut result = Some(true);
            for e in exprs {
                match eval(e, entity) {
                    Some(false) => return Some(false),
                    None => result = None,
                    Some(true) => {}
                }
            }
            result
        }
        Expr::Or(exprs) => {
            let mut result = Some(false);
            for e in exprs {
                match eval(e, entity) {
                    Some(true) => return Some(true),
                    None => result = None,
                    Some(false) => {}
                }
            }
            result
        }
        Expr::Not(inner) => eval(inner, entity).map(|b| !b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::entity::Audit;

    #[derive(Debug, Clone, sqlx::FromRow)]
    struct Widget {
        id: i64,
        name: String,
        weight: Option<i64>,
        #[sqlx(flatten)]
        audit: Audit,
    }

    impl Widget {
        const NAME: Column<Widget, String> = Column::new("name");
        const WEIGHT: Column<Widget, Option<i64>> = Column::new("weight");

        fn new(id: i64, name: &str, weight: Option<i64>) -> Self {
            Self {
                id,
                name: name.to_string(),
                weight,
                audit: Audit::default(),
            }
        }
    }

    impl Entity for Widget {
        type Key = i64;
        const TABLE: &'static str = "widgets";
        const CACHE_PREFIX: &'static str = "Widget";

        fn id(&self) -> &i64 {
            &self.id
        }
        fn set_id(&mut self, id: i64) {
            self.id = id;
        }
        fn audit(&self) -> &Audit {
            &self.audit
        }
        fn audit_mut(&mut self) -> &mut Audit {
            &mut self.audit
        }
        fn columns() -> &'static [&'static str] {
            &["name", "weight"]
        }
        fn values(&self) -> Vec<SqlValue> {
            vec![self.name.as_str().into(), self.weight.into()]
        }
    }

    #[test]
    fn test_renders_bound_parameters() {
        let filter = Widget::NAME
            .eq("bolt")
            .and(Widget::WEIGHT.gt(Some(3i64)))
            .and(Filter::not_deleted());

        let mut params = Vec::new();
        let sql = filter.to_sql(&mut params);

        assert_eq!(sql, r#"("name" = $1 AND "weight" > $2 AND "is_deleted" = $3)"#);
        assert_eq!(
            params,
            vec![SqlValue::from("bolt"), SqlValue::Int(Some(3)), SqlValue::Bool(Some(false))]
        );
    }

    #[test]
    fn test_values_never_reach_the_sql_text() {
        let mut params = vec![SqlValue::Int(Some(1))];
        let sql = Widget::NAME.starts_with("x'; DROP TABLE widgets; --").to_sql(&mut params);

        assert_eq!(sql, r#""name" LIKE $2"#);
        assert!(!sql.contains("DROP"));
        assert_eq!(params[1], SqlValue::from("x'; DROP TABLE widgets; --%"));
    }

    #[test]
    fn test_like_wildcards_are_escaped() {
        let mut params = Vec::new();
        Widget::NAME.contains("50%_off").to_sql(&mut params);
        assert_eq!(params[0], SqlValue::from("%50\\%\\_off%"));
    }

    #[test]
    fn test_case_insensitive_equality() {
        let mut params = Vec::new();
        let filter = Widget::NAME.eq_ignore_case("Bolt");
        assert_eq!(filter.to_sql(&mut params), r#"LOWER("name") = LOWER($1)"#);
        assert_eq!(params, vec![SqlValue::from("Bolt")]);

        assert!(filter.matches(&Widget::new(1, "BOLT", None)));
        assert!(!filter.matches(&Widget::new(2, "bolts", None)));
    }

    #[test]
    fn test_null_and_empty_in_rendering() {
        let mut params = Vec::new();
        assert_eq!(Widget::WEIGHT.eq(None::<i64>).to_sql(&mut params), r#""weight" IS NULL"#);
        assert_eq!(Widget::NAME.is_in(Vec::<String>::new()).to_sql(&mut params), "FALSE");
        assert_eq!((!Widget::WEIGHT.is_null()).to_sql(&mut params), r#"NOT ("weight" IS NULL)"#);
        assert!(params.is_empty());
    }

    #[test]
    fn test_in_memory_evaluation_matches_sql_semantics() {
        let light = Widget::new(1, "bolt", Some(2));
        let unknown = Widget::new(2, "nut", None);

        let heavy = Widget::WEIGHT.gt(Some(1i64));
        assert!(heavy.matches(&light));
        assert!(!heavy.matches(&unknown));
        // NOT of an unknown comparison is still unknown
        assert!(!(!heavy.clone()).matches(&unknown));

        assert!(Widget::NAME.is_in(["nut", "washer"]).matches(&unknown));
        assert!(Widget::NAME.starts_with("bo").or(Widget::WEIGHT.is_null()).matches(&unknown));
        assert!(Filter::<Widget>::id_eq(&1).matches(&light));
        assert!(Filter::<Widget>::all().matches(&unknown));
    }
}
