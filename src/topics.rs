//! Topic layout on the broker. The templates are fixed by the broker's
//! namespace; charger and user ids are substituted verbatim.

pub const COMMAND_TOPIC_TEMPLATE: &str = "evmeter/charger/{charger_id}/command";
pub const RESPONSE_TOPIC_TEMPLATE: &str = "evmeter/user/{user_id}/response";
pub const SESSION_TOPIC_TEMPLATE: &str = "evmeter/user/{user_id}/session";

pub const SESSION_ONLINE: &str = "online";
pub const SESSION_OFFLINE: &str = "offline";

pub fn command_topic(charger_id: &str) -> String {
    COMMAND_TOPIC_TEMPLATE.replace("{charger_id}", charger_id)
}

pub fn response_topic(user_id: &str) -> String {
    RESPONSE_TOPIC_TEMPLATE.replace("{user_id}", user_id)
}

pub fn session_topic(user_id: &str) -> String {
    SESSION_TOPIC_TEMPLATE.replace("{user_id}", user_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn templates() {
        assert_eq!(
            command_topic("EXAMPLE123456"),
            "evmeter/charger/EXAMPLE123456/command"
        );
        assert_eq!(
            response_topic("6578616D706C65"),
            "evmeter/user/6578616D706C65/response"
        );
        assert_eq!(
            session_topic("6578616D706C65"),
            "evmeter/user/6578616D706C65/session"
        );
    }

    #[test]
    fn ids_are_not_validated() {
        assert_eq!(command_topic(""), "evmeter/charger//command");
    }
}
