use crate::message::{MessageBuffer, Reply, rpl};
use crate::modes;
use crate::util::{mask_match, time_ms};
use kaede_unicase::u;
use std::collections::HashMap;

pub type MemberId = usize;

/// Modes applied to clients on a per-channel basis.
#[derive(Default)]
pub struct MemberModes {
    pub operator: bool,
    pub half_op: bool,
    pub voice: bool,
}

impl MemberModes {
    pub fn symbol(&self) -> Option<char> {
        if self.operator {
            Some('@')
        } else if self.half_op {
            Some('%')
        } else if self.voice {
            Some('+')
        } else {
            None
        }
    }

    /// Whether the member can change the topic and kick others.
    pub fn can_moderate(&self) -> bool {
        self.operator || self.half_op
    }
}

/// A channel ban.  Removed by exact mask match only.
pub struct Ban {
    /// Nickname of the user that set the ban.
    pub setter: String,

    /// A `nick!user@host` pattern, `*` and `?` wildcards allowed.
    pub mask: String,

    /// When the ban was set, in milliseconds since the epoch.
    pub at: u64,
}

/// Channel data.
pub struct Channel {
    /// The channel name as it was first joined.  Lookups go through the normalized form, this one
    /// is for display.
    pub name: String,

    /// Set of channel members, identified by their client id, and associated with their channel
    /// modes.
    pub members: HashMap<MemberId, MemberModes>,

    /// The topic.
    pub topic: Option<String>,

    pub user_limit: Option<usize>,
    pub key: Option<String>,

    /// Ban records, in the order they were set.
    pub bans: Vec<Ban>,

    /// Invited nicknames, stored as given.  Lookups re-normalize.
    pub invites: Vec<String>,

    pub invite_only: bool,
    pub moderated: bool,
    pub no_msg_from_outside: bool,
    pub private: bool,
    pub registered: bool,
    pub secret: bool,
    pub topic_restricted: bool,
}

impl Channel {
    /// Creates a channel with the default 'n', 't' and 'r' modes set.
    pub fn new(name: &str) -> Channel {
        Channel {
            name: name.to_owned(),
            members: HashMap::new(),
            topic: None,
            user_limit: None,
            key: None,
            bans: Vec::new(),
            invites: Vec::new(),
            invite_only: false,
            moderated: false,
            no_msg_from_outside: true,
            private: false,
            registered: true,
            secret: false,
            topic_restricted: true,
        }
    }

    /// Adds a member.  The first member of a channel is given operator status.
    pub fn add_member(&mut self, id: MemberId) {
        let modes = MemberModes {
            operator: self.members.is_empty(),
            half_op: false,
            voice: false,
        };
        self.members.insert(id, modes);
    }

    pub fn remove_member(&mut self, id: MemberId) {
        self.members.remove(&id);
    }

    pub fn is_public(&self) -> bool {
        !self.secret && !self.private
    }

    pub fn list_entry(&self, msg: MessageBuffer<'_>) {
        msg.param(&self.members.len().to_string())
            .trailing_param(self.topic.as_deref().unwrap_or(""));
    }

    /// Whether the given `nick!user@host` prefix matches one of the ban masks.
    pub fn is_banned(&self, prefix: &str) -> bool {
        self.bans.iter().any(|ban| mask_match(&ban.mask, prefix))
    }

    pub fn is_invited(&self, nick: &str) -> bool {
        self.invites.iter().any(|invited| u(invited) == u(nick))
    }

    pub fn invite(&mut self, nick: &str) {
        if !self.is_invited(nick) {
            self.invites.push(nick.to_owned());
        }
    }

    pub fn remove_invite(&mut self, nick: &str) {
        self.invites.retain(|invited| u(invited.as_str()) != u(nick));
    }

    pub fn can_talk(&self, id: MemberId) -> bool {
        if self.moderated {
            self.members.get(&id).map_or(false, |m| m.voice || m.can_moderate())
        } else {
            !self.no_msg_from_outside || self.members.contains_key(&id)
        }
    }

    /// Writes the canonical mode string of the channel.
    ///
    /// Mode parameters (key, user limit) are only written when `full_info` is set; it is given to
    /// members only.
    pub fn write_modes(&self, mut out: MessageBuffer<'_>, full_info: bool) {
        let modes = out.raw_param();
        modes.push('+');
        if self.invite_only { modes.push('i'); }
        if self.moderated { modes.push('m'); }
        if self.no_msg_from_outside { modes.push('n'); }
        if self.private { modes.push('p'); }
        if self.registered { modes.push('r'); }
        if self.secret { modes.push('s'); }
        if self.topic_restricted { modes.push('t'); }
        if self.user_limit.is_some() { modes.push('l'); }
        if self.key.is_some() { modes.push('k'); }
        if full_info {
            if let Some(user_limit) = self.user_limit {
                out = out.param(&user_limit.to_string());
            }
            if let Some(ref key) = self.key {
                out.param(key);
            }
        }
    }

    /// Applies a single mode change, returning whether the channel state actually changed (and
    /// thus whether the change must be broadcast).
    pub fn apply_mode_change<'b, F>(&mut self, change: modes::ChannelModeChange<'_>, by: &str,
                                    nick_of: F) -> Result<bool, Reply>
        where F: Fn(&MemberId) -> &'b str
    {
        use modes::ChannelModeChange::*;
        let mut applied = false;
        match change {
            InviteOnly(value) => {
                applied = self.invite_only != value;
                self.invite_only = value;
            },
            Moderated(value) => {
                applied = self.moderated != value;
                self.moderated = value;
            },
            NoMsgFromOutside(value) => {
                applied = self.no_msg_from_outside != value;
                self.no_msg_from_outside = value;
            },
            Private(value) => {
                applied = self.private != value;
                self.private = value;
            },
            Secret(value) => {
                applied = self.secret != value;
                self.secret = value;
            },
            TopicRestricted(value) => {
                applied = self.topic_restricted != value;
                self.topic_restricted = value;
            },
            Key(value, key) => if value {
                if self.key.is_some() {
                    return Err(rpl::ERR_KEYSET);
                }
                if !modes::is_valid_channel_key(key) {
                    return Err(rpl::ERR_BADCHANKEY);
                }
                applied = true;
                self.key = Some(key.to_owned());
            } else if self.key.is_some() {
                applied = true;
                self.key = None;
            },
            UserLimit(Some(s)) => if let Ok(limit) = s.parse() {
                applied = self.user_limit != Some(limit);
                self.user_limit = Some(limit);
            },
            UserLimit(None) => {
                applied = self.user_limit.is_some();
                self.user_limit = None;
            },
            ChangeBan(true, mask) => {
                if self.bans.iter().all(|ban| ban.mask != mask) {
                    self.bans.push(Ban {
                        setter: by.to_owned(),
                        mask: mask.to_owned(),
                        at: time_ms(),
                    });
                    applied = true;
                }
            },
            ChangeBan(false, mask) => {
                if let Some(pos) = self.bans.iter().position(|ban| ban.mask == mask) {
                    self.bans.remove(pos);
                    applied = true;
                }
            },
            ChangeOperator(value, param) => {
                let member = self.members.iter_mut().find(|(id, _)| u(nick_of(id)) == u(param));
                match member {
                    Some((_, modes)) => {
                        applied = modes.operator != value;
                        modes.operator = value;
                    }
                    None => return Err(rpl::ERR_USERNOTINCHANNEL),
                }
            },
            ChangeHalfop(value, param) => {
                let member = self.members.iter_mut().find(|(id, _)| u(nick_of(id)) == u(param));
                match member {
                    Some((_, modes)) => {
                        applied = modes.half_op != value;
                        modes.half_op = value;
                    }
                    None => return Err(rpl::ERR_USERNOTINCHANNEL),
                }
            },
            ChangeVoice(value, param) => {
                let member = self.members.iter_mut().find(|(id, _)| u(nick_of(id)) == u(param));
                match member {
                    Some((_, modes)) => {
                        applied = modes.voice != value;
                        modes.voice = value;
                    }
                    None => return Err(rpl::ERR_USERNOTINCHANNEL),
                }
            },
            GetBans => {},
        }
        Ok(applied)
    }

    /// The channel symbol used in NAMES replies.
    pub fn symbol(&self) -> &'static str {
        if self.secret {
            "@"
        } else if self.private {
            "*"
        } else {
            "="
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modes::ChannelModeChange;

    fn no_nick(_: &MemberId) -> &'static str {
        ""
    }

    #[test]
    fn test_default_modes() {
        let chan = Channel::new("#Test");
        assert!(chan.no_msg_from_outside);
        assert!(chan.topic_restricted);
        assert!(chan.registered);
        assert!(!chan.invite_only && !chan.moderated && !chan.secret && !chan.private);
        assert!(chan.is_public());
    }

    #[test]
    fn test_first_member_is_operator() {
        let mut chan = Channel::new("#test");
        chan.add_member(1);
        chan.add_member(2);
        assert!(chan.members[&1].operator);
        assert!(!chan.members[&2].operator);
    }

    #[test]
    fn test_is_public_tracks_flags() {
        let mut chan = Channel::new("#test");
        chan.apply_mode_change(ChannelModeChange::Secret(true), "op", no_nick).unwrap();
        assert!(!chan.is_public());
        chan.apply_mode_change(ChannelModeChange::Secret(false), "op", no_nick).unwrap();
        chan.apply_mode_change(ChannelModeChange::Private(true), "op", no_nick).unwrap();
        assert!(!chan.is_public());
        chan.apply_mode_change(ChannelModeChange::Private(false), "op", no_nick).unwrap();
        assert!(chan.is_public());
    }

    #[test]
    fn test_ban_dedup() {
        let mut chan = Channel::new("#test");
        assert!(chan.apply_mode_change(ChannelModeChange::ChangeBan(true, "bad!*@*"), "op", no_nick)
            .unwrap());
        assert!(!chan.apply_mode_change(ChannelModeChange::ChangeBan(true, "bad!*@*"), "op", no_nick)
            .unwrap());
        assert_eq!(chan.bans.len(), 1);
        assert!(!chan.apply_mode_change(ChannelModeChange::ChangeBan(false, "other!*@*"), "op", no_nick)
            .unwrap());
        assert!(chan.apply_mode_change(ChannelModeChange::ChangeBan(false, "bad!*@*"), "op", no_nick)
            .unwrap());
        assert!(chan.bans.is_empty());
    }

    #[test]
    fn test_ban_matching() {
        let mut chan = Channel::new("#test");
        chan.apply_mode_change(ChannelModeChange::ChangeBan(true, "*!*@evil.host"), "op", no_nick)
            .unwrap();
        assert!(chan.is_banned("anyone!user@evil.host"));
        assert!(!chan.is_banned("anyone!user@good.host"));
    }

    #[test]
    fn test_key_already_set() {
        let mut chan = Channel::new("#test");
        assert_eq!(chan.apply_mode_change(ChannelModeChange::Key(true, "sesame"), "op", no_nick),
                   Ok(true));
        assert_eq!(chan.apply_mode_change(ChannelModeChange::Key(true, "other"), "op", no_nick),
                   Err(rpl::ERR_KEYSET));
        assert_eq!(chan.apply_mode_change(ChannelModeChange::Key(false, "*"), "op", no_nick),
                   Ok(true));
        assert_eq!(chan.key, None);
    }

    #[test]
    fn test_bad_key_rejected() {
        let mut chan = Channel::new("#test");
        assert_eq!(chan.apply_mode_change(ChannelModeChange::Key(true, "x"), "op", no_nick),
                   Err(rpl::ERR_BADCHANKEY));
        assert_eq!(chan.key, None);
    }

    #[test]
    fn test_mode_round_trip() {
        let mut chan = Channel::new("#test");
        assert!(chan.apply_mode_change(ChannelModeChange::Moderated(true), "op", no_nick).unwrap());
        // Setting twice does not count as a change, so nothing is re-broadcast.
        assert!(!chan.apply_mode_change(ChannelModeChange::Moderated(true), "op", no_nick).unwrap());
        assert!(chan.apply_mode_change(ChannelModeChange::Moderated(false), "op", no_nick).unwrap());
        assert!(!chan.moderated);
    }

    #[test]
    fn test_invites_renormalize() {
        let mut chan = Channel::new("#test");
        chan.invite("Some{Nick}");
        assert!(chan.is_invited("some[nick]"));
        chan.remove_invite("SOME[NICK]");
        assert!(!chan.is_invited("Some{Nick}"));
    }
}
