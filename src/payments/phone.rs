use crate::payments::types::MobileMoneyProvider;

/// Country calling code stripped from numbers entered in international form.
pub const DEFAULT_COUNTRY_CODE: &str = "237";

const LOCAL_NUMBER_LEN: usize = 9;

/// Reduces user input to the bare local subscriber number.
///
/// Non-digits are dropped and a leading country code is removed when what
/// remains is a local-length number. Anything else is returned as digits
/// unchanged, so callers still need [`validate_phone_number`].
pub fn format_phone_number(phone: &str) -> String {
    format_with_country_code(phone, DEFAULT_COUNTRY_CODE)
}

pub fn format_with_country_code(phone: &str, country_code: &str) -> String {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    match digits.strip_prefix(country_code) {
        Some(local) if local.len() == LOCAL_NUMBER_LEN => local.to_string(),
        _ => digits,
    }
}

/// True when `phone` is a 9-digit local number starting with `6` whose
/// two-digit prefix belongs to `medium`.
pub fn validate_phone_number(phone: &str, medium: MobileMoneyProvider) -> bool {
    validate_with_country_code(phone, medium, DEFAULT_COUNTRY_CODE)
}

pub fn validate_with_country_code(
    phone: &str,
    medium: MobileMoneyProvider,
    country_code: &str,
) -> bool {
    let local = format_with_country_code(phone, country_code);
    is_local_mobile_number(&local) && medium.allowed_prefixes().contains(&&local[..2])
}

/// Every operator whose prefix list accepts the number. Prefixes 65 and 66
/// are claimed by both operators, so this can return more than one.
pub fn providers_for_number(phone: &str) -> Vec<MobileMoneyProvider> {
    providers_with_country_code(phone, DEFAULT_COUNTRY_CODE)
}

pub fn providers_with_country_code(phone: &str, country_code: &str) -> Vec<MobileMoneyProvider> {
    MobileMoneyProvider::ALL
        .into_iter()
        .filter(|provider| validate_with_country_code(phone, *provider, country_code))
        .collect()
}

fn is_local_mobile_number(local: &str) -> bool {
    local.len() == LOCAL_NUMBER_LEN
        && local.starts_with('6')
        && local.chars().all(|c| c.is_ascii_digit())
}
