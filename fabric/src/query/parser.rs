use sqlparser::ast::{
    Expr, Function, FunctionArg, FunctionArgExpr, FunctionArguments, Join, Query, Select,
    SetExpr, Statement, TableFactor, TableWithJoins,
};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use super::{DestinationType, QueryStmt, QueryType};
use crate::error::{FabricError, Result};

pub(super) fn parse_query(sql: &str) -> Result<QueryStmt> {
    let mut statements = Parser::parse_sql(&GenericDialect {}, sql)?;
    if statements.len() != 1 {
        return Err(FabricError::Parse(format!(
            "expected exactly one statement, got {}",
            statements.len()
        )));
    }
    let stmt = statements.remove(0);

    let mut qs = parse_stmt(stmt)?;
    qs.origin_query = sql.to_string();
    Ok(qs)
}

fn parse_stmt(stmt: Statement) -> Result<QueryStmt> {
    match stmt {
        Statement::Query(query) => {
            let mut qs = QueryStmt {
                query_type: QueryType::Select,
                destination_type: DestinationType::Local,
                destination_table: None,
                required_tables: Vec::new(),
                origin_query: String::new(),
            };
            parse_top_query(&query, &mut qs)?;
            qs.destination_table = qs.required_tables.first().cloned();
            Ok(qs)
        }
        Statement::Insert(insert) => {
            let mut qs = QueryStmt {
                query_type: QueryType::Insert,
                destination_type: DestinationType::Origin,
                destination_table: None,
                required_tables: Vec::new(),
                origin_query: String::new(),
            };
            if let Some(source) = &insert.source {
                parse_top_query(source, &mut qs)?;
            }
            let table = insert.table.to_string();
            qs.required_tables.push(table.clone());
            qs.destination_table = Some(table);
            Ok(qs)
        }
        Statement::Update(update) => {
            let mut qs = QueryStmt {
                query_type: QueryType::Update,
                destination_type: DestinationType::Origin,
                destination_table: None,
                required_tables: Vec::new(),
                origin_query: String::new(),
            };
            parse_table_with_joins(&update.table, &mut qs)?;
            if let Some(selection) = &update.selection {
                parse_expression(selection, &mut qs)?;
            }
            qs.destination_table = qs.required_tables.first().cloned();
            Ok(qs)
        }
        other => Err(FabricError::UnsupportedStatement(other.to_string())),
    }
}

/// SELECT (or a set operation over SELECTs) can only come from a single
/// `FROM` expression at the original implementation's top level; we honor
/// that restriction here too, recursing only into the first table.
fn parse_top_query(query: &Query, qs: &mut QueryStmt) -> Result<()> {
    match query.body.as_ref() {
        SetExpr::Select(select) => parse_select(select, qs),
        SetExpr::Query(inner) => parse_top_query(inner, qs),
        SetExpr::SetOperation { left, right, .. } => {
            parse_top_query_set_expr(left, qs)?;
            parse_top_query_set_expr(right, qs)
        }
        // A literal VALUES list references no tables; mirrors the original
        // implementation, which only descends into an INSERT's source when
        // it is itself a SELECT.
        SetExpr::Values(_) => Ok(()),
        other => Err(FabricError::Parse(format!(
            "unsupported query body: {other}"
        ))),
    }
}

fn parse_top_query_set_expr(expr: &SetExpr, qs: &mut QueryStmt) -> Result<()> {
    match expr {
        SetExpr::Select(select) => parse_select(select, qs),
        SetExpr::Query(inner) => parse_top_query(inner, qs),
        SetExpr::SetOperation { left, right, .. } => {
            parse_top_query_set_expr(left, qs)?;
            parse_top_query_set_expr(right, qs)
        }
        // A literal VALUES list references no tables; mirrors the original
        // implementation, which only descends into an INSERT's source when
        // it is itself a SELECT.
        SetExpr::Values(_) => Ok(()),
        other => Err(FabricError::Parse(format!(
            "unsupported query body: {other}"
        ))),
    }
}

fn parse_select(select: &Select, qs: &mut QueryStmt) -> Result<()> {
    if select.from.len() != 1 {
        return Err(FabricError::Parse(
            "currently only one expression in from supported".to_string(),
        ));
    }
    parse_table_with_joins(&select.from[0], qs)?;
    if let Some(selection) = &select.selection {
        parse_expression(selection, qs)?;
    }
    Ok(())
}

fn parse_table_with_joins(expr: &TableWithJoins, qs: &mut QueryStmt) -> Result<()> {
    parse_table_factor(&expr.relation, qs)?;
    for join in &expr.joins {
        parse_join(join, qs)?;
    }
    Ok(())
}

fn parse_join(join: &Join, qs: &mut QueryStmt) -> Result<()> {
    parse_table_factor(&join.relation, qs)
}

fn parse_table_factor(expr: &TableFactor, qs: &mut QueryStmt) -> Result<()> {
    match expr {
        TableFactor::Table { name, .. } => {
            qs.required_tables.push(name.to_string());
            Ok(())
        }
        TableFactor::Derived { subquery, .. } => parse_top_query(subquery, qs),
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => parse_table_with_joins(table_with_joins, qs),
        TableFactor::TableFunction { expr, .. } => parse_expression(expr, qs),
        TableFactor::Function { args, .. } => {
            for arg in args {
                parse_function_arg(arg, qs)?;
            }
            Ok(())
        }
        other => Err(FabricError::Parse(format!(
            "unsupported table expression: {other}"
        ))),
    }
}

fn parse_function_arg(arg: &FunctionArg, qs: &mut QueryStmt) -> Result<()> {
    let expr = match arg {
        FunctionArg::Named { arg, .. } | FunctionArg::ExprNamed { arg, .. } => arg,
        FunctionArg::Unnamed(arg) => arg,
    };
    match expr {
        FunctionArgExpr::Expr(expr) => parse_expression(expr, qs),
        FunctionArgExpr::QualifiedWildcard(_) | FunctionArgExpr::Wildcard => Ok(()),
        _ => Ok(()),
    }
}

fn parse_function(func: &Function, qs: &mut QueryStmt) -> Result<()> {
    if let FunctionArguments::List(list) = &func.args {
        for arg in &list.args {
            parse_function_arg(arg, qs)?;
        }
    }
    Ok(())
}

/// Unlike the original implementation, every compound expression here
/// recurses into its children: `AND`/`OR`/`NOT`/comparisons can carry
/// subqueries that touch additional tables, and skipping them under-counts
/// `required_tables`.
fn parse_expression(expr: &Expr, qs: &mut QueryStmt) -> Result<()> {
    match expr {
        Expr::Identifier(_) | Expr::CompoundIdentifier(_) | Expr::Value(_) => Ok(()),
        Expr::UnaryOp { expr, .. } => parse_expression(expr, qs),
        Expr::BinaryOp { left, right, .. } => {
            parse_expression(left, qs)?;
            parse_expression(right, qs)
        }
        Expr::Nested(inner) => parse_expression(inner, qs),
        Expr::Function(func) => parse_function(func, qs),
        Expr::Subquery(query) => parse_top_query(query, qs),
        Expr::Exists { subquery, .. } => parse_top_query(subquery, qs),
        Expr::InSubquery { expr, subquery, .. } => {
            parse_expression(expr, qs)?;
            parse_top_query(subquery, qs)
        }
        Expr::InList { expr, list, .. } => {
            parse_expression(expr, qs)?;
            for item in list {
                parse_expression(item, qs)?;
            }
            Ok(())
        }
        Expr::Between {
            expr, low, high, ..
        } => {
            parse_expression(expr, qs)?;
            parse_expression(low, qs)?;
            parse_expression(high, qs)
        }
        Expr::Tuple(items) => {
            for item in items {
                parse_expression(item, qs)?;
            }
            Ok(())
        }
        Expr::Interval(interval) => parse_expression(&interval.value, qs),
        Expr::Case {
            operand,
            conditions,
            else_result,
            ..
        } => {
            if let Some(operand) = operand {
                parse_expression(operand, qs)?;
            }
            for when in conditions {
                parse_expression(&when.condition, qs)?;
                parse_expression(&when.result, qs)?;
            }
            if let Some(else_result) = else_result {
                parse_expression(else_result, qs)?;
            }
            Ok(())
        }
        other => Err(FabricError::Parse(format!(
            "unsupported expression: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{DestinationType, QueryType};

    #[test]
    fn select_classifies_local_with_required_table() {
        let qs = parse_query("SELECT id, name FROM users WHERE id = 1").unwrap();
        assert_eq!(qs.query_type(), QueryType::Select);
        assert_eq!(qs.destination_type(), DestinationType::Local);
        assert_eq!(qs.required_tables(), &["users".to_string()]);
        assert_eq!(qs.destination_table(), Some("users"));
    }

    #[test]
    fn insert_classifies_origin_with_values_list() {
        let qs = parse_query("INSERT INTO users (id, name) VALUES (1, 'a')").unwrap();
        assert_eq!(qs.query_type(), QueryType::Insert);
        assert_eq!(qs.destination_type(), DestinationType::Origin);
        assert_eq!(qs.required_tables(), &["users".to_string()]);
        assert_eq!(qs.destination_table(), Some("users"));
    }

    #[test]
    fn update_classifies_origin_with_required_table() {
        let qs = parse_query("UPDATE users SET name = 'b' WHERE id = 1").unwrap();
        assert_eq!(qs.query_type(), QueryType::Update);
        assert_eq!(qs.destination_type(), DestinationType::Origin);
        assert_eq!(qs.required_tables(), &["users".to_string()]);
    }

    #[test]
    fn select_with_join_requires_both_tables() {
        let qs =
            parse_query("SELECT u.id FROM users u JOIN orders o ON u.id = o.user_id").unwrap();
        assert_eq!(
            qs.required_tables(),
            &["users".to_string(), "orders".to_string()]
        );
    }

    #[test]
    fn where_clause_with_or_and_not_recurses_into_subquery() {
        // The original implementation's parser stops at AND/OR/NOT without
        // descending into their operands, so a subquery hidden inside one
        // would never contribute to required_tables. This traverses fully.
        let qs = parse_query(
            "SELECT id FROM users WHERE NOT (id = 1 OR id IN (SELECT user_id FROM orders))",
        )
        .unwrap();
        assert_eq!(
            qs.required_tables(),
            &["users".to_string(), "orders".to_string()]
        );
    }

    #[test]
    fn delete_statement_is_unsupported() {
        let err = parse_query("DELETE FROM users WHERE id = 1").unwrap_err();
        assert!(matches!(err, FabricError::UnsupportedStatement(_)));
    }

    #[test]
    fn multiple_statements_are_rejected() {
        let err = parse_query("SELECT 1; SELECT 2;").unwrap_err();
        assert!(matches!(err, FabricError::Parse(_)));
    }
}
