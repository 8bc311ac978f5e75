//! Mode parsing and validation

use std::borrow::Borrow;

/// User modes supported by kaede.  Advertised in welcome messages.
pub const USER_MODES: &str = "iow";

/// Channel modes that have no parameters and are supported by kaede.  Advertised in welcome
/// messages.
pub const SIMPLE_CHAN_MODES: &str = "imnprst";

/// Channel modes that require a parameter and are supported by kaede.  Advertised in welcome
/// messages.
pub const EXTENDED_CHAN_MODES: &str = "bhklov";

/// Iterates over the flags of a mode string, with the sign carried from flag to flag.
///
/// `"+ab-c+d"` yields `(true, b'a')`, `(true, b'b')`, `(false, b'c')`, `(true, b'd')`.
fn flag_stream(modes: &str) -> impl Iterator<Item = (bool, u8)> + '_ {
    let mut plus = true;
    modes.bytes().filter_map(move |b| match b {
        b'+' => { plus = true; None }
        b'-' => { plus = false; None }
        flag => Some((plus, flag)),
    })
}

/// *_query related errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
    /// One of the modes in the query is unknown.
    UnknownMode(char),

    /// A mode is missing its required parameter.
    MissingModeParam,

    /// This mode is supported by kaede, but cannot be changed with the MODE command.
    UnchangeableMode,
}

/// Alias to std's Result using this module's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Item of a user mode query.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UserModeChange {
    Invisible(bool),
    Wallops(bool),
    DeOperator,
}

impl UserModeChange {
    /// Whether this change is enabling or disabling a mode.
    pub fn value(self) -> bool {
        match self {
            Self::Invisible(v) | Self::Wallops(v) => v,
            Self::DeOperator => false,
        }
    }

    /// The letter of this mode change.
    pub fn symbol(self) -> char {
        match self {
            Self::Invisible(..) => 'i',
            Self::Wallops(..) => 'w',
            Self::DeOperator => 'o',
        }
    }
}

/// An iterator over the changes of a user MODE query.
///
/// Operator status can be dropped with `-o`, but only granted through OPER, so `+o` comes out as
/// `Error::UnchangeableMode`.
pub fn user_query(modes: &str) -> impl Iterator<Item = Result<UserModeChange>> + '_ {
    flag_stream(modes).map(|(value, flag)| match flag {
        b'i' => Ok(UserModeChange::Invisible(value)),
        b'w' => Ok(UserModeChange::Wallops(value)),
        b'o' if value => Err(Error::UnchangeableMode),
        b'o' => Ok(UserModeChange::DeOperator),
        unknown => Err(Error::UnknownMode(unknown as char)),
    })
}

/// Item of a channel mode query.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelModeChange<'a> {
    InviteOnly(bool),
    Moderated(bool),
    NoMsgFromOutside(bool),
    Private(bool),
    Secret(bool),
    TopicRestricted(bool),
    Key(bool, &'a str),
    UserLimit(Option<&'a str>),
    GetBans,
    ChangeBan(bool, &'a str),
    ChangeOperator(bool, &'a str),
    ChangeHalfop(bool, &'a str),
    ChangeVoice(bool, &'a str),
}

impl ChannelModeChange<'_> {
    /// Whether this change is enabling or disabling a mode.
    pub fn value(&self) -> bool {
        use ChannelModeChange::*;
        match *self {
            InviteOnly(v) | Moderated(v) | NoMsgFromOutside(v) | Private(v) | Secret(v)
                | TopicRestricted(v) | Key(v, ..) | ChangeBan(v, ..) | ChangeOperator(v, ..)
                | ChangeHalfop(v, ..) | ChangeVoice(v, ..) => v,
            UserLimit(l) => l.is_some(),
            GetBans => false,
        }
    }

    /// The letter of this mode change.
    pub fn symbol(&self) -> char {
        use ChannelModeChange::*;
        match self {
            InviteOnly(..) => 'i',
            Moderated(..) => 'm',
            NoMsgFromOutside(..) => 'n',
            Private(..) => 'p',
            Secret(..) => 's',
            TopicRestricted(..) => 't',
            Key(..) => 'k',
            UserLimit(..) => 'l',
            ChangeBan(..) | GetBans => 'b',
            ChangeOperator(..) => 'o',
            ChangeHalfop(..) => 'h',
            ChangeVoice(..) => 'v',
        }
    }

    /// The parameter of this mode change.
    pub fn param(&self) -> Option<&str> {
        use ChannelModeChange::*;
        match *self {
            Key(_, p) | ChangeBan(_, p) | ChangeOperator(_, p) | ChangeHalfop(_, p)
                | ChangeVoice(_, p) => Some(p),
            UserLimit(l) => l,
            _ => None,
        }
    }
}

/// An iterator over the changes of a channel MODE query.
///
/// Parameters are consumed positionally, one per flag that needs one, so that e.g.
/// `MODE #chan +ov nick1 nick2` gives operator to `nick1` and voice to `nick2`.
pub fn channel_query<'a, I, S>(modes: &'a str, params: I)
    -> impl Iterator<Item = Result<ChannelModeChange<'a>>>
where
    I: IntoIterator<Item = &'a S> + 'a,
    S: Borrow<str> + 'a,
{
    let mut params = params.into_iter().map(|p| p.borrow()).filter(|p| !p.is_empty());
    flag_stream(modes).map(move |(value, flag)| {
        use ChannelModeChange::*;
        match flag {
            b'i' => Ok(InviteOnly(value)),
            b'm' => Ok(Moderated(value)),
            b'n' => Ok(NoMsgFromOutside(value)),
            b'p' => Ok(Private(value)),
            b's' => Ok(Secret(value)),
            b't' => Ok(TopicRestricted(value)),
            b'k' => match (params.next(), value) {
                (Some(key), _) => Ok(Key(value, key)),
                // A bare "MODE -k" clears whatever key is set.
                (None, false) => Ok(Key(false, "*")),
                (None, true) => Err(Error::MissingModeParam),
            },
            b'l' if !value => Ok(UserLimit(None)),
            b'l' => params.next().map(|n| UserLimit(Some(n))).ok_or(Error::MissingModeParam),
            b'b' => Ok(params.next().map_or(GetBans, |mask| ChangeBan(value, mask))),
            b'o' => params.next().map(|n| ChangeOperator(value, n)).ok_or(Error::MissingModeParam),
            b'h' => params.next().map(|n| ChangeHalfop(value, n)).ok_or(Error::MissingModeParam),
            b'v' => params.next().map(|n| ChangeVoice(value, n)).ok_or(Error::MissingModeParam),
            b'r' => Err(Error::UnchangeableMode),
            unknown => Err(Error::UnknownMode(unknown as char)),
        }
    })
}

/// Whether the given channel key is well-formed.
///
/// Keys are 2 to 8 characters long and must not contain 8-bit, control, space or comma
/// characters.
pub fn is_valid_channel_key(key: &str) -> bool {
    (2..=8).contains(&key.len())
        && key.bytes().all(|b| (0x21..0x7f).contains(&b) && b != b',')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_stream() {
        let flags: Vec<_> = flag_stream("+ab+C++D+-+E--fg+-h").collect();
        assert_eq!(flags, [(true, b'a'), (true, b'b'), (true, b'C'), (true, b'D'),
                           (true, b'E'), (false, b'f'), (false, b'g'), (false, b'h')]);
        assert_eq!(flag_stream("a").collect::<Vec<_>>(), [(true, b'a')]);
        assert_eq!(flag_stream("").count(), 0);
        assert_eq!(flag_stream("+-+").count(), 0);
    }

    #[test]
    fn test_user_query() {
        let changes: Vec<_> = user_query("+iw-o").collect();
        assert_eq!(changes, [Ok(UserModeChange::Invisible(true)),
                             Ok(UserModeChange::Wallops(true)),
                             Ok(UserModeChange::DeOperator)]);

        let changes: Vec<_> = user_query("+oX").collect();
        assert_eq!(changes, [Err(Error::UnchangeableMode), Err(Error::UnknownMode('X'))]);
    }

    #[test]
    fn test_chanmode_key() {
        use ChannelModeChange::*;

        let changes: Vec<_> = channel_query::<_, String>("+k", &[]).collect();
        assert_eq!(changes, [Err(Error::MissingModeParam)]);

        let changes: Vec<_> = channel_query("+k", &["beer"]).collect();
        assert_eq!(changes, [Ok(Key(true, "beer"))]);

        let changes: Vec<_> = channel_query::<_, String>("-k", &[]).collect();
        assert_eq!(changes, [Ok(Key(false, "*"))]);

        let changes: Vec<_> = channel_query("+kb", &["beer"]).collect();
        assert_eq!(changes, [Ok(Key(true, "beer")), Ok(GetBans)]);

        let changes: Vec<_> = channel_query("+bk", &["beer"]).collect();
        assert_eq!(changes, [Ok(ChangeBan(true, "beer")), Err(Error::MissingModeParam)]);
    }

    #[test]
    fn test_chanmode_positional_params() {
        use ChannelModeChange::*;

        let changes: Vec<_> = channel_query("+ov", &["alice", "bob"]).collect();
        assert_eq!(changes, [Ok(ChangeOperator(true, "alice")), Ok(ChangeVoice(true, "bob"))]);

        let changes: Vec<_> = channel_query("-o+l", &["admin", "20"]).collect();
        assert_eq!(changes, [Ok(ChangeOperator(false, "admin")), Ok(UserLimit(Some("20")))]);
    }

    #[test]
    fn test_chanmode_unchangeable() {
        let changes: Vec<_> = channel_query::<_, String>("+r", &[]).collect();
        assert_eq!(changes, [Err(Error::UnchangeableMode)]);
    }

    #[test]
    fn test_channel_key_validation() {
        assert!(is_valid_channel_key("hunter2"));
        assert!(is_valid_channel_key("ab"));
        assert!(!is_valid_channel_key("a"));
        assert!(!is_valid_channel_key("waytoolongkey"));
        assert!(!is_valid_channel_key("with space"));
        assert!(!is_valid_channel_key("no,comma"));
        assert!(!is_valid_channel_key("tab\there"));
    }
}
