use rust_decimal::Decimal;

use crate::averages::AVERAGE_DP;
use crate::models::{AttendanceRecord, AttendanceStatus, AttendanceSummary};

/// Late counts as present; excused counts as absent.
pub fn summarize(records: &[AttendanceRecord]) -> AttendanceSummary {
    let mut present_days = 0u32;
    let mut absent_days = 0u32;

    for record in records {
        match record.status {
            AttendanceStatus::Present | AttendanceStatus::Late => present_days += 1,
            AttendanceStatus::Absent | AttendanceStatus::Excused => absent_days += 1,
        }
    }

    let total_days = present_days + absent_days;
    let attendance_rate = if total_days == 0 {
        None
    } else {
        Some(
            (Decimal::from(present_days) * Decimal::ONE_HUNDRED / Decimal::from(total_days))
                .round_dp(AVERAGE_DP),
        )
    };

    AttendanceSummary {
        total_days,
        present_days,
        absent_days,
        attendance_rate,
    }
}
