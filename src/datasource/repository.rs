pub mod episodes;
pub mod films;
pub mod password_resets;
pub mod reports;
pub mod seasons;
pub mod series;
pub mod tokens;
pub mod transactions;
pub mod users;

/// Converts a nullable `INTEGER` duration column into seconds.
fn duration_from_column(value: Option<i32>) -> Option<u32> {
    value.and_then(|v| u32::try_from(v).ok())
}

fn duration_to_column(value: Option<u32>) -> Option<i32> {
    value.and_then(|v| i32::try_from(v).ok())
}
