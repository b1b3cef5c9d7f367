/// Build a dynamic SQL SET clause field-by-field.
///
/// Checks if an `Option` value is `Some`, and if so, appends
/// `"column = ?N"` to `sets`, boxes the value into `values` and increments
/// `param_idx`.
///
/// # Usage
///
/// ```ignore
/// // With an `input` struct whose fields are Option<T>:
/// push_field!(input.nickname, "nickname", sets, values, param_idx);
///
/// // Nullable columns use Option<Option<T>>; Some(None) writes NULL:
/// push_field!(input.default_top_k, "default_top_k", sets, values, param_idx);
/// ```
#[macro_export]
macro_rules! push_field {
    ($field:expr, $col:literal, $sets:expr, $values:expr, $param_idx:expr) => {
        if let Some(ref v) = $field {
            $sets.push(format!("{} = ?{}", $col, $param_idx));
            $values.push(Box::new(v.clone()) as Box<dyn rusqlite::types::ToSql>);
            $param_idx += 1;
        }
    };
}
