//! Localization boundary.
//!
//! Culture resolution lives with the platform. The codec only asks for a
//! template by key and fills `{0}` itself.

/// Template keys used when rendering system messages.
pub mod keys {
    /// `{0}` joined.
    pub const USER_JOINED: &str = "UserJoinedConvo";
    /// `{0}` left.
    pub const USER_LEFT: &str = "UserLeftConvo";
    /// `{0}` was kicked.
    pub const USER_KICKED: &str = "UserKickedFromConvo";
    /// Conversation expires soon; `{0}` is the server hint.
    pub const CONVO_EXPIRING_SOON: &str = "ConvoExpiringSoon";
    /// Metadata changed; `{0}` is the list of changed fields.
    pub const METADATA_CHANGED: &str = "ConvoMetadataChanged";
    /// Prefix for field names (`ConvoField.title`, ...).
    pub const FIELD_PREFIX: &str = "ConvoField.";
}

/// Translates template keys into the user's language.
pub trait Localizer: Send + Sync {
    /// Localized template for `key`. Unknown keys return the key itself.
    fn translate(&self, key: &str) -> String;
}

/// Built-in English templates.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnglishLocalizer;

impl Localizer for EnglishLocalizer {
    fn translate(&self, key: &str) -> String {
        let text = match key {
            keys::USER_JOINED => "{0} joined the convo.",
            keys::USER_LEFT => "{0} left the convo.",
            keys::USER_KICKED => "{0} has been kicked out of the convo.",
            keys::CONVO_EXPIRING_SOON => "This convo expires soon ({0}).",
            keys::METADATA_CHANGED => "The convo's {0} changed.",
            "ConvoField.admin" => "admin",
            "ConvoField.title" => "title",
            "ConvoField.description" => "description",
            "ConvoField.expiration" => "expiration date",
            "ConvoField.password" => "password",
            other => other,
        };
        text.to_string()
    }
}

/// Render `key`'s template with `arg` substituted for `{0}`.
pub fn render(localizer: &(impl Localizer + ?Sized), key: &str, arg: &str) -> String {
    localizer.translate(key).replace("{0}", arg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_key_falls_back_to_key() {
        assert_eq!(EnglishLocalizer.translate("NoSuchKey"), "NoSuchKey");
    }

    #[test]
    fn render_substitutes_argument() {
        assert_eq!(render(&EnglishLocalizer, keys::USER_LEFT, "bob"), "bob left the convo.");
    }
}
