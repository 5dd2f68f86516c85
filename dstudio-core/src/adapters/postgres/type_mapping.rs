//! Catalog value interpretation for PostgreSQL.
//!
//! Turns raw catalog codes and expressions (relkind letters, referential
//! action rules, column defaults) into model values.

use crate::models::{ReferentialAction, TableKind};

/// Maps a `pg_class.relkind` code to a table kind.
///
/// `v` is a view, `m` a materialized view; everything else (ordinary,
/// partitioned and foreign tables) is reported as a table.
pub fn classify_relkind(relkind: &str) -> TableKind {
    match relkind {
        "v" => TableKind::View,
        "m" => TableKind::MaterializedView,
        _ => TableKind::Table,
    }
}

/// Maps an `information_schema` referential action rule to the model enum.
///
/// Unknown rules fall back to `NO ACTION`, which is PostgreSQL's default.
pub fn map_referential_action(action_rule: &str) -> ReferentialAction {
    match action_rule.to_uppercase().as_str() {
        "CASCADE" => ReferentialAction::Cascade,
        "SET NULL" => ReferentialAction::SetNull,
        "SET DEFAULT" => ReferentialAction::SetDefault,
        "RESTRICT" => ReferentialAction::Restrict,
        "NO ACTION" => ReferentialAction::NoAction,
        _ => {
            tracing::warn!("Unknown referential action rule: '{}'", action_rule);
            ReferentialAction::NoAction
        }
    }
}

/// Whether a column is filled from a sequence.
///
/// True when the default expression calls `nextval(` (serial columns) or the
/// column is an identity column (`attidentity` of `a` or `d`).
pub fn is_auto_increment(default_value: Option<&str>, identity: &str) -> bool {
    let from_sequence = default_value
        .map(|expr| expr.trim_start().to_ascii_lowercase().starts_with("nextval("))
        .unwrap_or(false);
    from_sequence || matches!(identity, "a" | "d")
}

/// Catalog integers are signed; negative values mean "unknown".
pub(crate) fn non_negative_u32(value: Option<i32>) -> Option<u32> {
    value.and_then(|v| u32::try_from(v).ok())
}

/// Catalog counters are signed; negative values mean "unknown".
pub(crate) fn non_negative_u64(value: Option<i64>) -> Option<u64> {
    value.and_then(|v| u64::try_from(v).ok())
}
