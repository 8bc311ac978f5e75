//! Reply texts, kept in one place so wording stays consistent.

use crate::message::MessageBuffer;

//
// Network messages
//

pub const CLOSING_LINK: &str = "Closing link";

pub const CONNECTION_RESET: &str = "Connection reset by peer";

pub const PING_TIMEOUT: &str = "Ping timeout";

pub const BROKEN_PIPE: &str = "Broken pipe";

pub const LINE_TOO_LONG: &str = "Request line too long";

//
// IRC replies
//

pub const ALREADY_REGISTERED: &str = "Unauthorized command (already registered)";

pub const NOW_AWAY: &str = "You have been marked as being away";

pub const UN_AWAY: &str = "You are no longer marked as being away";

pub const BAD_CHAN_KEY: &str = "Cannot join channel (+k)";

pub const BAD_KEY: &str = "Key is not well-formed";

pub const BANNED_FROM_CHAN: &str = "Cannot join channel (+b)";

pub const CANNOT_SEND_TO_CHAN: &str = "Cannot send to channel";

pub const CHAN_O_PRIVS_NEEDED: &str = "You're not channel operator";

pub const CHANNEL_IS_FULL: &str = "Cannot join channel (+l)";

pub const END_OF_BAN_LIST: &str = "End of channel ban list";

pub const END_OF_LIST: &str = "End of /LIST";

pub const END_OF_MOTD: &str = "End of /MOTD command";

pub const END_OF_NAMES: &str = "End of /NAMES list";

pub const END_OF_WHO: &str = "End of /WHO list";

pub const END_OF_WHOIS: &str = "End of /WHOIS list";

pub const END_OF_WHOWAS: &str = "End of WHOWAS";

pub const ERRONEOUS_NICKNAME: &str = "Erroneous nickname";

pub const INVITE_ONLY_CHAN: &str = "Cannot join channel (+i)";

pub const KEY_SET: &str = "Channel key already set";

pub const NEED_MORE_PARAMS: &str = "Not enough parameters";

pub const NICKNAME_IN_USE: &str = "Nickname is already in use";

pub const NO_MOTD: &str = "MOTD File is missing";

pub const NO_NICKNAME_GIVEN: &str = "No nickname given";

pub const NO_PRIVILEGES: &str = "Permission Denied: You're not an IRC operator";

pub const NO_RECIPIENT: &str = "No recipient given";

pub const NO_SUCH_CHANNEL: &str = "No such channel";

pub const NO_SUCH_NICK: &str = "No such nick/channel";

pub const NO_SUCH_SERVER: &str = "No such server";

pub const NO_TEXT_TO_SEND: &str = "No text to send";

pub const NO_TOPIC: &str = "No topic is set";

pub const NOT_ON_CHANNEL: &str = "You're not on that channel";

pub const NOT_REGISTERED: &str = "You have not registered";

pub const PASSWORD_MISMATCH: &str = "Password incorrect";

pub const UNKNOWN_MODE: &str = "is unknown mode char to me";

pub const UNKNOWN_MODE_FLAG: &str = "Unknown MODE flag";

pub const USER_NOT_IN_CHANNEL: &str = "They aren't on that channel";

pub const USER_ON_CHANNEL: &str = "is already on channel";

pub const USERS_DONT_MATCH: &str = "Cannot change mode for other users";

pub const WAS_NO_SUCH_NICK: &str = "There was no such nickname";

pub const WHOIS_IDLE: &str = "seconds idle, signon time";

pub const WHOIS_OPERATOR: &str = "is an IRC operator";

pub const YOURE_OPER: &str = "You are now an IRC operator";

//
// Welcome messages
//

pub fn welcome(msg: MessageBuffer<'_>, network: &str, full_name: &str) {
    msg.trailing_param(&format!("Welcome to the {} IRC Network {}", network, full_name));
}

pub fn your_host(msg: MessageBuffer<'_>, domain: &str, version: &str) {
    msg.trailing_param(&format!("Your host is {}, running version {}", domain, version));
}

pub fn created(msg: MessageBuffer<'_>, since: &str) {
    msg.trailing_param(&format!("This server was created {}", since));
}

pub fn motd_start(msg: MessageBuffer<'_>, domain: &str) {
    msg.trailing_param(&format!("- {} Message of the Day -", domain));
}
