//! Console formatting: ETH amounts, durations and the ANSI-styled step
//! output used by the demo scenarios.

use timelock_protocol::types::{Amount, WEI_PER_ETH};
use timelock_protocol::Address;

use crate::error::AmountParseError;

/// Decimal places of one ETH.
pub const ETH_DECIMALS: usize = 18;

/// Decimal places shown by [`format_eth`].
const DISPLAY_DECIMALS: usize = 4;

// ---------------------------------------------------------------------------
// Amounts
// ---------------------------------------------------------------------------

/// `1_500_000_000_000_000_000` → `"1.5000 ETH"`. Truncates, never rounds up.
pub fn format_eth(wei: Amount) -> String {
    let whole = wei / WEI_PER_ETH;
    let frac = wei % WEI_PER_ETH;
    let shown = frac / 10u128.pow((ETH_DECIMALS - DISPLAY_DECIMALS) as u32);
    format!("{}.{:0width$} ETH", whole, shown, width = DISPLAY_DECIMALS)
}

/// Full-precision rendering for amounts too small for [`format_eth`].
pub fn format_wei(wei: Amount) -> String {
    format!("{} wei", wei)
}

/// Parses a decimal ETH string (`"1.5"`, `"0.01"`, `"3"`) into wei.
pub fn parse_eth(input: &str) -> Result<Amount, AmountParseError> {
    let input = input.trim();
    let input = input
        .strip_suffix("ETH")
        .or_else(|| input.strip_suffix("eth"))
        .unwrap_or(input)
        .trim();
    if input.is_empty() {
        return Err(AmountParseError::Empty);
    }

    let (whole, frac) = match input.split_once('.') {
        Some((whole, frac)) => (whole, frac),
        None => (input, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(AmountParseError::Empty);
    }
    if frac.len() > ETH_DECIMALS {
        return Err(AmountParseError::TooManyDecimals { max: ETH_DECIMALS });
    }

    let whole = parse_digits(whole)?;
    let frac_value = parse_digits(frac)?;
    let frac_scale = 10u128.pow((ETH_DECIMALS - frac.len()) as u32);

    whole
        .checked_mul(WEI_PER_ETH)
        .and_then(|w| frac_value.checked_mul(frac_scale).and_then(|f| w.checked_add(f)))
        .ok_or(AmountParseError::Overflow)
}

fn parse_digits(digits: &str) -> Result<Amount, AmountParseError> {
    digits.chars().try_fold(0u128, |acc, c| {
        let d = c.to_digit(10).ok_or(AmountParseError::InvalidDigit(c))?;
        acc.checked_mul(10)
            .and_then(|v| v.checked_add(d as u128))
            .ok_or(AmountParseError::Overflow)
    })
}

/// `90_061` → `"1d 1h 1m 1s"`. Zero components are skipped.
pub fn format_duration(secs: u64) -> String {
    if secs == 0 {
        return "0s".to_string();
    }
    let parts = [
        (secs / 86_400, "d"),
        (secs % 86_400 / 3_600, "h"),
        (secs % 3_600 / 60, "m"),
        (secs % 60, "s"),
    ];
    parts
        .iter()
        .filter(|(n, _)| *n > 0)
        .map(|(n, unit)| format!("{}{}", n, unit))
        .collect::<Vec<_>>()
        .join(" ")
}

// ---------------------------------------------------------------------------
// ANSI output
// ---------------------------------------------------------------------------

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";

const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const MAGENTA: &str = "\x1b[35m";
const CYAN: &str = "\x1b[36m";
const WHITE: &str = "\x1b[37m";

const BG_BLUE: &str = "\x1b[44m";

pub fn banner(title: &str, subtitle: &str) {
    println!();
    println!("{BG_BLUE}{BOLD}{WHITE}  {title:<66}{RESET}");
    println!("{BG_BLUE}{WHITE}  {subtitle:<66}{RESET}");
    println!();
}

pub fn section(num: u32, title: &str) {
    println!();
    println!(
        "{BOLD}{CYAN}===[{YELLOW} Step {num} {CYAN}]=============================================================={RESET}"
    );
    println!("{BOLD}{WHITE}  {title}{RESET}");
}

pub fn subsection(text: &str) {
    println!("{DIM}{CYAN}  >> {text}{RESET}");
}

pub fn success(text: &str) {
    println!("{GREEN}  [OK] {text}{RESET}");
}

/// An expected rejection, shown in red but not a failure of the run.
pub fn rejected(text: &str) {
    println!("{RED}  [REJECTED] {text}{RESET}");
}

pub fn info(label: &str, value: &str) {
    println!("{WHITE}  {BOLD}{label}:{RESET} {YELLOW}{value}{RESET}");
}

pub fn account(name: &str, address: &Address) {
    println!("  {MAGENTA}{BOLD}{name:<8}{RESET}  {DIM}{}{RESET}", address.short());
}

pub fn timing(label: &str, elapsed: std::time::Duration) {
    let ms = elapsed.as_secs_f64() * 1000.0;
    println!("{DIM}{MAGENTA}  [{label}: {ms:.2} ms]{RESET}");
}
