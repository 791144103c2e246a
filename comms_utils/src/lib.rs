pub mod identifiers;
pub mod names;
pub mod time;

pub use identifiers::{
    email_domain, is_personal_email_domain, normalize_email, normalize_phone, split_whatsapp_id,
    WHATSAPP_SUFFIX,
};
pub use names::{clean_display_name, is_generic_email};
pub use time::{parse_epoch_number, parse_provider_timestamp};

#[cfg(test)]
mod tests;
