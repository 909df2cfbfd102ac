//! Bitmap image checker: the leading bytes must match the declared type.

use crate::context::ValidationContext;
use crate::media;
use crate::report::{CheckReport, ValidationDiagnostic};

pub(super) fn check(ctx: &ValidationContext, bytes: &[u8], report: &mut CheckReport) {
    let declared = media::essence(ctx.media_type());
    match media::sniff_bitmap(bytes) {
        Some(actual) if actual == declared => {}
        Some(actual) => report.push(
            ValidationDiagnostic::error(
                "MED_IMAGE_TYPE_MISMATCH",
                format!("image is declared as '{}' but its content is '{}'", declared, actual),
            )
            .with_arg(declared)
            .with_arg(actual),
        ),
        None => report.push(
            ValidationDiagnostic::warning(
                "MED_IMAGE_UNRECOGNIZED",
                format!("image content does not look like '{}'", declared),
            )
            .with_arg(declared),
        ),
    }
}
