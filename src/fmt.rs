//! Provides helpers for rendering and parsing byte sizes.
//!
//! Cache budgets are plain byte counts internally. [format_size](format_size) renders them in
//! a concise human readable form for stats and log output, [parse_size](parse_size) reads
//! human friendly expressions like `64m` when budgets come from a configuration.
use anyhow::Context;

/// The binary units a size can be rendered in, in ascending magnitude.
const UNITS: [&str; 6] = ["bytes", "KiB", "MiB", "GiB", "TiB", "PiB"];

/// Formats a given size in bytes.
///
/// The size is scaled into the largest binary unit which keeps the number above one, with
/// enough digits to remain meaningful (three significant digits at most).
///
/// # Examples
///
/// ```
/// assert_eq!(callisto::fmt::format_size(0), "0 bytes");
/// assert_eq!(callisto::fmt::format_size(1), "1 byte");
/// assert_eq!(callisto::fmt::format_size(1023), "1023 bytes");
/// assert_eq!(callisto::fmt::format_size(1024), "1.00 KiB");
/// assert_eq!(callisto::fmt::format_size(8_734), "8.53 KiB");
/// assert_eq!(callisto::fmt::format_size(873_400), "853 KiB");
/// assert_eq!(callisto::fmt::format_size(64 * 1024 * 1024), "64.0 MiB");
/// assert_eq!(callisto::fmt::format_size(8_734_000_000), "8.13 GiB");
/// ```
pub fn format_size(size_in_bytes: usize) -> String {
    if size_in_bytes == 1 {
        return "1 byte".to_owned();
    }
    if size_in_bytes < 1024 {
        return format!("{} bytes", size_in_bytes);
    }

    let mut size = size_in_bytes as f64;
    let mut unit = 0;
    while size >= 1024. && unit < UNITS.len() - 1 {
        size /= 1024.;
        unit += 1;
    }

    if size < 10. {
        format!("{:.2} {}", size, UNITS[unit])
    } else if size < 100. {
        format!("{:.1} {}", size, UNITS[unit])
    } else {
        format!("{:.0} {}", size, UNITS[unit])
    }
}

/// Parses a byte size from a given string.
///
/// The expression consists of a positive integer followed by an optional unit suffix:
/// * **b** or **B**: plain bytes
/// * **k** or **K**: KiB (multiplies by 1024)
/// * **m** or **M**: MiB
/// * **g** or **G**: GiB
/// * **t** or **T**: TiB
///
/// Whitespace around the number and suffix is ignored. Returns an **Err** for anything else,
/// notably decimal numbers, negative numbers, unknown suffixes and sizes exceeding the
/// addressable range.
///
/// # Examples
///
/// ```
/// assert_eq!(callisto::fmt::parse_size("100").unwrap(), 100);
/// assert_eq!(callisto::fmt::parse_size("100b").unwrap(), 100);
/// assert_eq!(callisto::fmt::parse_size("8k").unwrap(), 8192);
/// assert_eq!(callisto::fmt::parse_size("8m").unwrap(), 8 * 1024 * 1024);
/// assert_eq!(callisto::fmt::parse_size("4 G").unwrap(), 4 * 1024 * 1024 * 1024);
///
/// // An invalid suffix results in an error...
/// assert_eq!(callisto::fmt::parse_size("3 Y").is_err(), true);
///
/// // Decimal numbers result in an error...
/// assert_eq!(callisto::fmt::parse_size("1.2g").is_err(), true);
///
/// // Negative numbers result in an error...
/// assert_eq!(callisto::fmt::parse_size("-1").is_err(), true);
/// ```
pub fn parse_size(expression: impl AsRef<str>) -> anyhow::Result<usize> {
    let expression = expression.as_ref().trim();

    // The leading digits form the number, everything behind them has to be a known unit.
    // Digits are ASCII, so the char count is also the byte offset of the suffix...
    let digits = expression
        .chars()
        .take_while(|digit| digit.is_ascii_digit())
        .count();
    let (number, suffix) = expression.split_at(digits);

    let factor: usize = match suffix.trim_start() {
        "" | "b" | "B" => 1,
        "k" | "K" => 1024,
        "m" | "M" => 1024 * 1024,
        "g" | "G" => 1024 * 1024 * 1024,
        "t" | "T" => 1024 * 1024 * 1024 * 1024,
        _ => {
            return Err(anyhow::anyhow!(
                "Cannot parse '{}' into a size expression. Expected a positive number and \
                 optionally 'b', 'k', 'm', 'g' or 't' as suffix.",
                expression
            ))
        }
    };

    let number = number.parse::<usize>().with_context(|| {
        format!(
            "Cannot parse '{}' into a size expression. Expected a positive number and \
             optionally 'b', 'k', 'm', 'g' or 't' as suffix.",
            expression
        )
    })?;

    number
        .checked_mul(factor)
        .with_context(|| format!("The size expression '{}' exceeds the addressable range.", expression))
}
