//! Typed SQL construction for the columnar backend.
//!
//! Statements are assembled from validated parts ([`Ident`], [`Literal`],
//! [`Predicate`]) and rendered through `Display`, so identifiers can never
//! carry arbitrary text and every literal is quoted and escaped.
//!
//! [`QueryBuilder`] turns a [`DatasetQuery`] into:
//!
//! ```text
//! SELECT aoi_id, aoi_type, <group-by...>, <AGG>(<field>) AS <name>
//! FROM <dataset>
//! WHERE <filters...> AND aoi_id in (<ids>)
//! GROUP BY aoi_id, aoi_type, <group-by...>
//! ```

use std::collections::BTreeMap;
use std::fmt;

use super::query::{AggregateFunction, DatasetQuery, FilterValue, Operator, ALL_ROWS};
use crate::api::{AOI_ID_COLUMN, AOI_TYPE_COLUMN};
use crate::error::BuildError;

/// A validated SQL identifier, optionally schema-qualified (`a.b`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ident(String);

impl Ident {
    pub fn new(name: &str) -> Result<Self, BuildError> {
        let valid = !name.is_empty()
            && name.split('.').all(|segment| {
                let mut chars = segment.chars();
                matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                    && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
            });
        if valid {
            Ok(Self(name.to_string()))
        } else {
            Err(BuildError::InvalidIdentifier(name.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A SQL literal value.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Integer(i64),
    Float(f64),
    Text(String),
    List(Vec<Literal>),
}

impl Literal {
    fn is_list(&self) -> bool {
        matches!(self, Literal::List(_))
    }
}

impl From<&FilterValue> for Literal {
    fn from(value: &FilterValue) -> Self {
        match value {
            FilterValue::Integer(v) => Literal::Integer(*v),
            FilterValue::Float(v) => Literal::Float(*v),
            FilterValue::Text(v) => Literal::Text(v.clone()),
            FilterValue::List(items) => Literal::List(items.iter().map(Literal::from).collect()),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Integer(v) => write!(f, "{}", v),
            Literal::Float(v) => write!(f, "{}", v),
            Literal::Text(v) => write!(f, "'{}'", v.replace('\'', "''")),
            Literal::List(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str(")")
            }
        }
    }
}

/// `column <op> literal`
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    column: Ident,
    operator: Operator,
    value: Literal,
}

impl Predicate {
    /// Build a predicate, checking that the operand fits the operator:
    /// `in` takes a non-empty list, every other operator a scalar.
    pub fn new(column: Ident, operator: Operator, value: Literal) -> Result<Self, BuildError> {
        let operand_fits = match (operator, &value) {
            (Operator::In, Literal::List(items)) if items.is_empty() => {
                return Err(BuildError::EmptyValueList(column.to_string()));
            }
            (Operator::In, Literal::List(items)) => !items.iter().any(Literal::is_list),
            (Operator::In, _) => false,
            (_, literal) => !literal.is_list(),
        };
        if !operand_fits {
            return Err(BuildError::InvalidOperand {
                operator: operator.to_string(),
                value: value.to_string(),
            });
        }
        Ok(Self {
            column,
            operator,
            value,
        })
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.column, self.operator, self.value)
    }
}

/// Expressions allowed in a select list.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(Ident),
    /// `argument: None` renders as `*`.
    Aggregate {
        function: AggregateFunction,
        argument: Option<Ident>,
    },
    /// Scalar function of one column, e.g. `ST_AsGeoJSON(geom)`.
    Function { name: &'static str, argument: Ident },
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(ident) => write!(f, "{}", ident),
            Expr::Aggregate {
                function,
                argument: Some(arg),
            } => write!(f, "{}({})", function.as_sql(), arg),
            Expr::Aggregate {
                function,
                argument: None,
            } => write!(f, "{}(*)", function.as_sql()),
            Expr::Function { name, argument } => write!(f, "{}({})", name, argument),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub expr: Expr,
    pub alias: Option<Ident>,
}

impl SelectItem {
    pub fn column(ident: Ident) -> Self {
        Self {
            expr: Expr::Column(ident),
            alias: None,
        }
    }

    pub fn aliased(expr: Expr, alias: Ident) -> Self {
        Self {
            expr,
            alias: Some(alias),
        }
    }

    /// Name of the resulting column.
    pub fn output_name(&self) -> String {
        match (&self.alias, &self.expr) {
            (Some(alias), _) => alias.to_string(),
            (None, Expr::Column(ident)) => ident.to_string(),
            (None, expr) => expr.to_string(),
        }
    }
}

impl fmt::Display for SelectItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.alias {
            Some(alias) => write!(f, "{} AS {}", self.expr, alias),
            None => write!(f, "{}", self.expr),
        }
    }
}

/// `SELECT ... FROM ... [WHERE ...] [GROUP BY ...]`
#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    pub columns: Vec<SelectItem>,
    pub from: Ident,
    pub predicates: Vec<Predicate>,
    pub group_by: Vec<Ident>,
}

impl SelectStatement {
    /// Result column names in select order.
    pub fn output_columns(&self) -> Vec<String> {
        self.columns.iter().map(SelectItem::output_name).collect()
    }
}

fn write_joined<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T], sep: &str) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl fmt::Display for SelectStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SELECT ")?;
        write_joined(f, &self.columns, ", ")?;
        write!(f, " FROM {}", self.from)?;
        if !self.predicates.is_empty() {
            f.write_str(" WHERE ")?;
            write_joined(f, &self.predicates, " AND ")?;
        }
        if !self.group_by.is_empty() {
            f.write_str(" GROUP BY ")?;
            write_joined(f, &self.group_by, ", ")?;
        }
        Ok(())
    }
}

/// Builds aggregation statements from [`DatasetQuery`] values.
///
/// Logical field names are resolved through a field map; a builder without
/// a map uses each field name as its own column.
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    fields: Option<BTreeMap<String, String>>,
}

impl QueryBuilder {
    /// Builder that maps every field to the column of the same name.
    pub fn new() -> Self {
        Self { fields: None }
    }

    /// Builder that only accepts fields present in `fields`.
    pub fn with_fields(fields: BTreeMap<String, String>) -> Self {
        Self {
            fields: Some(fields),
        }
    }

    /// Resolve a logical field to its backend column.
    pub fn resolve(&self, dataset: &str, field: &str) -> Result<Ident, BuildError> {
        let column = match &self.fields {
            Some(fields) => fields.get(field).ok_or_else(|| BuildError::UnresolvedField {
                dataset: dataset.to_string(),
                field: field.to_string(),
            })?,
            None => field,
        };
        Ident::new(column)
    }

    /// Build the statement for `query`, restricted to `aoi_ids`.
    ///
    /// Fails with [`BuildError::EmptyAoiIds`] rather than emitting `in ()`.
    pub fn build(
        &self,
        aoi_ids: &[String],
        query: &DatasetQuery,
    ) -> Result<SelectStatement, BuildError> {
        if aoi_ids.is_empty() {
            return Err(BuildError::EmptyAoiIds);
        }

        let aoi_id = Ident::new(AOI_ID_COLUMN)?;
        let aoi_type = Ident::new(AOI_TYPE_COLUMN)?;

        let mut group_by = vec![aoi_id.clone(), aoi_type];
        for field in &query.group_by {
            if field == AOI_ID_COLUMN || field == AOI_TYPE_COLUMN {
                continue;
            }
            let column = self.resolve(&query.dataset, field)?;
            if !group_by.contains(&column) {
                group_by.push(column);
            }
        }

        let aggregation = &query.aggregation;
        let argument = if aggregation.field == ALL_ROWS {
            if aggregation.function != AggregateFunction::Count {
                return Err(BuildError::InvalidOperand {
                    operator: aggregation.function.as_sql().to_string(),
                    value: ALL_ROWS.to_string(),
                });
            }
            None
        } else {
            Some(self.resolve(&query.dataset, &aggregation.field)?)
        };

        let mut columns: Vec<SelectItem> =
            group_by.iter().cloned().map(SelectItem::column).collect();
        columns.push(SelectItem::aliased(
            Expr::Aggregate {
                function: aggregation.function,
                argument,
            },
            Ident::new(aggregation.output_name())?,
        ));

        let mut predicates = Vec::with_capacity(query.filters.len() + 1);
        for filter in &query.filters {
            let column = self.resolve(&query.dataset, &filter.field)?;
            predicates.push(Predicate::new(
                column,
                filter.operator,
                Literal::from(&filter.value),
            )?);
        }
        predicates.push(Predicate::new(
            aoi_id,
            Operator::In,
            Literal::List(aoi_ids.iter().cloned().map(Literal::Text).collect()),
        )?);

        Ok(SelectStatement {
            columns,
            from: Ident::new(&query.dataset)?,
            predicates,
            group_by,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::query::{Aggregation, Filter};

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn tree_cover_query() -> DatasetQuery {
        DatasetQuery::new("tree_cover", Aggregation::sum("area__ha"))
            .group_by("country")
            .filter(Filter::new("year", Operator::Ge, 2020i64))
    }

    #[test]
    fn test_builds_expected_statement_shape() {
        let sql = QueryBuilder::new()
            .build(&ids(&["A", "B"]), &tree_cover_query())
            .unwrap()
            .to_string();

        assert!(sql.starts_with("SELECT aoi_id, aoi_type, country, SUM(area__ha) AS area__ha"));
        assert!(sql.contains(" FROM tree_cover "));
        assert!(sql.contains("WHERE year >= 2020 AND aoi_id in ('A', 'B')"));
        assert!(sql.ends_with("GROUP BY aoi_id, aoi_type, country"));
    }

    #[test]
    fn test_empty_id_list_is_rejected() {
        let err = QueryBuilder::new().build(&[], &tree_cover_query()).unwrap_err();
        assert_eq!(err, BuildError::EmptyAoiIds);
    }

    #[test]
    fn test_aoi_filter_is_always_appended() {
        let query = DatasetQuery::new("tree_cover", Aggregation::sum("area__ha"));
        let sql = QueryBuilder::new()
            .build(&ids(&["BRA"]), &query)
            .unwrap()
            .to_string();
        assert_eq!(
            sql,
            "SELECT aoi_id, aoi_type, SUM(area__ha) AS area__ha FROM tree_cover \
             WHERE aoi_id in ('BRA') GROUP BY aoi_id, aoi_type"
        );
    }

    #[test]
    fn test_output_columns_follow_declaration_order() {
        let query = tree_cover_query().group_by("loss_year");
        let statement = QueryBuilder::new().build(&ids(&["A"]), &query).unwrap();
        assert_eq!(
            statement.output_columns(),
            vec!["aoi_id", "aoi_type", "country", "loss_year", "area__ha"]
        );
    }

    #[test]
    fn test_fields_resolve_through_map() {
        let fields = BTreeMap::from([
            ("year".to_string(), "umd_tree_cover_loss__year".to_string()),
            ("area__ha".to_string(), "umd_tree_cover_loss__ha".to_string()),
        ]);
        let query = DatasetQuery::new("tcl_summary", Aggregation::sum("area__ha"))
            .group_by("year");
        let sql = QueryBuilder::with_fields(fields)
            .build(&ids(&["A"]), &query)
            .unwrap()
            .to_string();
        assert!(sql.contains("SUM(umd_tree_cover_loss__ha) AS area__ha"));
        assert!(sql.contains("GROUP BY aoi_id, aoi_type, umd_tree_cover_loss__year"));
    }

    #[test]
    fn test_unmapped_field_fails_before_rendering() {
        let fields = BTreeMap::from([("area__ha".to_string(), "area__ha".to_string())]);
        let err = QueryBuilder::with_fields(fields)
            .build(&ids(&["A"]), &tree_cover_query())
            .unwrap_err();
        assert!(matches!(err, BuildError::UnresolvedField { ref field, .. } if field == "country"));
    }

    #[test]
    fn test_text_literals_are_escaped() {
        let query = DatasetQuery::new("tree_cover", Aggregation::sum("area__ha"));
        let sql = QueryBuilder::new()
            .build(&ids(&["x') OR 1=1 --"]), &query)
            .unwrap()
            .to_string();
        assert!(sql.contains("aoi_id in ('x'') OR 1=1 --')"));
    }

    #[test]
    fn test_identifiers_are_validated() {
        assert!(Ident::new("gadm.adm2_summary").is_ok());
        assert!(Ident::new("area; DROP TABLE x").is_err());
        assert!(Ident::new("1col").is_err());
        assert!(Ident::new("").is_err());
    }

    #[test]
    fn test_in_filter_renders_list() {
        let query = DatasetQuery::new("umd_tree_cover_gain", Aggregation::sum("gain_area__ha"))
            .filter(Filter::new(
                "gain_period",
                Operator::In,
                vec!["2000-2005", "2005-2010"],
            ));
        let sql = QueryBuilder::new()
            .build(&ids(&["A"]), &query)
            .unwrap()
            .to_string();
        assert!(sql.contains("gain_period in ('2000-2005', '2005-2010') AND aoi_id in ('A')"));
    }

    #[test]
    fn test_operand_must_match_operator() {
        let column = Ident::new("year").unwrap();
        assert!(Predicate::new(column.clone(), Operator::In, Literal::Integer(1)).is_err());
        assert!(Predicate::new(
            column.clone(),
            Operator::Ge,
            Literal::List(vec![Literal::Integer(1)])
        )
        .is_err());
        assert_eq!(
            Predicate::new(column, Operator::In, Literal::List(vec![])).unwrap_err(),
            BuildError::EmptyValueList("year".to_string())
        );
    }

    #[test]
    fn test_count_star() {
        let query = DatasetQuery::new("alerts", Aggregation::count());
        let sql = QueryBuilder::new()
            .build(&ids(&["A"]), &query)
            .unwrap()
            .to_string();
        assert!(sql.contains("COUNT(*) AS count"));
    }
}
