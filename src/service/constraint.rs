//! Turns database constraint violations into client errors using catalog metadata.

use crate::config::{ConstraintInfo, ResolvedModel};
use crate::error::AppError;
use sqlx::postgres::PgDatabaseError;

/// What the failing statement was doing; decides how a foreign key violation reads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DbAction {
    Write,
    Delete,
}

pub fn translate(model: &ResolvedModel, err: sqlx::Error, action: DbAction) -> AppError {
    let classified = match &err {
        sqlx::Error::Database(db) => {
            let column = db
                .try_downcast_ref::<PgDatabaseError>()
                .and_then(|pg| pg.column());
            db.code().and_then(|code| {
                classify(model, action, &code, db.constraint(), column, db.message())
            })
        }
        _ => None,
    };
    classified.unwrap_or(AppError::Db(err))
}

/// SQLSTATE class 23 (integrity) and class 22 (bad data) become 400s; anything else stays a 500.
pub fn classify(
    model: &ResolvedModel,
    action: DbAction,
    code: &str,
    constraint: Option<&str>,
    column: Option<&str>,
    message: &str,
) -> Option<AppError> {
    let info = constraint.and_then(|c| model.constraint(c));
    let err = match code {
        "23505" => AppError::Conflict(match info {
            Some(ConstraintInfo::Unique { message, .. }) => message.clone(),
            _ => "Record already exists".to_string(),
        }),
        "23503" => match (info, action) {
            (Some(ConstraintInfo::ForeignKey { from_table, to_table, .. }), DbAction::Delete) => {
                AppError::Conflict(format!("{} is referenced by {}", to_table, from_table))
            }
            (Some(ConstraintInfo::ForeignKey { from_column, to_table, .. }), DbAction::Write) => {
                AppError::BadRequest(format!("{} does not reference an existing {}", from_column, to_table))
            }
            (_, DbAction::Delete) => AppError::Conflict("Record is still referenced".to_string()),
            (_, DbAction::Write) => AppError::BadRequest("Invalid reference".to_string()),
        },
        "23502" => AppError::Validation(format!("{} is required", column.unwrap_or("field"))),
        "23514" => AppError::Validation(match info {
            Some(ConstraintInfo::Check { message, .. }) => message.clone(),
            _ => message.to_string(),
        }),
        c if c.starts_with("22") => {
            tracing::warn!(code = c, column = ?column, error = message, "rejected value");
            AppError::BadRequest(match column {
                Some(col) => format!("invalid value for {}", col),
                None => "Invalid value".to_string(),
            })
        }
        _ => return None,
    };
    Some(err)
}
