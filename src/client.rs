//! User data and connection state tracking.

use crate::message::{Command, Reply, ResponseBuffer, rpl};
use crate::modes;
use crate::util;
use std::sync::Arc;
use tokio::sync::mpsc;

/// A shared, immutable message buffer, ready to be written on a socket.
///
/// Broadcasts clone the `Arc`, not the bytes.
#[derive(Clone, Debug)]
pub struct MessageQueueItem(Arc<str>);

impl From<String> for MessageQueueItem {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl From<ResponseBuffer> for MessageQueueItem {
    fn from(response: ResponseBuffer) -> Self {
        Self::from(response.build())
    }
}

impl AsRef<str> for MessageQueueItem {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The write end of a connection's outgoing message channel.
///
/// It is unbounded, so pushing messages onto it never blocks; the reader side lives in the
/// connection task and writes items to the socket in order.
pub type MessageQueue = mpsc::UnboundedSender<MessageQueueItem>;

/// Client data.
pub struct Client {
    /// The queue of messages to be sent to the client.
    ///
    /// `None` for users learned over a server link; messages for them are relayed to the link
    /// peer instead.
    queue: Option<MessageQueue>,

    /// The state of the connection with the client.
    state: ConnectionState,

    /// The nickname.  `*` until the client sends NICK.
    nick: String,

    /// The username.
    user: String,

    /// The real name.
    real: String,

    /// The hostname shown in prefixes and WHO replies.  Starts as the peer IP, replaced if the
    /// reverse lookup resolves.
    host: String,

    /// Name of the server this user is connected to.
    pub server: String,

    /// Number of server hops between this server and the user.  Zero for local users.
    pub hop_count: u32,

    /// User modes, in the order they were set.
    modes: Vec<char>,

    /// Names of the channels this user is in, in join order.
    pub channels: Vec<String>,

    pub away_message: Option<String>,

    /// Whether the server password check has passed.  Meaningless when no password is
    /// configured.
    pub password_accepted: bool,

    /// Lines received while a password check is in flight, replayed in order once it
    /// completes.
    pub held_lines: Vec<String>,

    /// Set while a password check is in flight.
    pub awaiting_verify: bool,

    /// Set for connections accepted on the link listener.  They skip the connection password
    /// gate, since their PASS carries a link password instead.
    pub on_link_port: bool,

    /// The argument of the last PASS command, kept for the link handshake.
    pub given_password: Option<String>,

    /// Set on server links this side initiated; our introduction is sent at connect time
    /// instead of after the peer's PASS is verified.
    pub initiated_link: bool,

    /// When the client registered, in seconds since the epoch.
    pub signon_time: u64,

    /// When the client last talked (PRIVMSG, NOTICE, JOIN), in seconds since the epoch.
    /// Reported as the idle time in WHOIS replies.
    pub last_action_time: u64,

    /// When the client last sent any line, in seconds since the epoch.  The ping sweep
    /// disconnects clients whose `last_ping` is too old.
    pub last_ping: u64,

    /// The reason sent when a client quits.
    ///
    /// Set when it issues a "QUIT" message.
    quit_message: Option<String>,
}

impl Client {
    /// Initialize the data for a new local client, given its message queue.
    ///
    /// The nickname is set to "*", as it seems it's what freenode server does.  The username and
    /// the realname are set to empty strings.
    pub fn new(queue: MessageQueue, host: String, server: String) -> Client {
        let now = util::time();
        Client {
            queue: Some(queue),
            state: ConnectionState::new(),
            nick: String::from("*"),
            user: String::new(),
            real: String::new(),
            host,
            server,
            hop_count: 0,
            modes: Vec::new(),
            channels: Vec::new(),
            away_message: None,
            password_accepted: false,
            held_lines: Vec::new(),
            awaiting_verify: false,
            on_link_port: false,
            given_password: None,
            initiated_link: false,
            signon_time: now,
            last_action_time: now,
            last_ping: now,
            quit_message: None,
        }
    }

    /// Initialize the data for a user introduced by a server link's NICK burst.
    pub fn new_remote(nick: &str, user: &str, real: &str, host: &str, server: String,
                      hop_count: u32) -> Client {
        let now = util::time();
        Client {
            queue: None,
            state: ConnectionState::Registered,
            nick: nick.to_owned(),
            user: user.to_owned(),
            real: real.to_owned(),
            host: host.to_owned(),
            server,
            hop_count,
            modes: Vec::new(),
            channels: Vec::new(),
            away_message: None,
            password_accepted: true,
            held_lines: Vec::new(),
            awaiting_verify: false,
            on_link_port: false,
            given_password: None,
            initiated_link: false,
            signon_time: now,
            last_action_time: now,
            last_ping: now,
            quit_message: None,
        }
    }

    pub fn is_local(&self) -> bool {
        self.queue.is_some()
    }

    /// Change the connection state of the client given the command it just sent.
    ///
    /// # Panics
    ///
    /// This function panics if the command cannot be issued in the client current state.
    /// `Client::can_issue_command` should be called before.
    pub fn apply_command(&mut self, cmd: Command) -> ConnectionState {
        self.state = self.state.apply(cmd).unwrap();
        self.state
    }

    /// Whether or not the client can issue the given command.
    ///
    /// This function does not change the connection state.
    pub fn can_issue_command(&self, cmd: Command) -> bool {
        self.state.apply(cmd).is_ok()
    }

    /// The client quit message, or a default one if it has not set any.
    pub fn quit_message(&self) -> &str {
        self.quit_message.as_ref().map_or("Left without saying anything...", String::as_str)
    }

    /// Sets the client quit message (or reason).
    pub fn set_quit_message(&mut self, reason: Option<&str>) {
        self.quit_message = reason.map(str::to_owned)
    }

    /// Pushes a message onto the client queue.
    ///
    /// Fails when the connection task is gone; callers must then treat the client as
    /// disconnected.  Sending to a remote user is a no-op.
    pub fn send<M>(&self, msg: M) -> Result<(), ()>
        where M: Into<MessageQueueItem>
    {
        match self.queue {
            Some(ref queue) => queue.send(msg.into()).map_err(|_| ()),
            None => Ok(()),
        }
    }

    /// The nickname of the client.
    pub fn nick(&self) -> &str {
        &self.nick
    }

    /// Change the nickname of the client.
    ///
    /// This function does not change the connection state.
    pub fn set_nick(&mut self, nick: &str) {
        self.nick.clear();
        self.nick.push_str(nick);
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn real(&self) -> &str {
        &self.real
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn set_host(&mut self, host: &str) {
        self.host.clear();
        self.host.push_str(host);
    }

    /// The `nick!user@host` prefix of the client.
    pub fn full_name(&self) -> String {
        format!("{}!{}@{}", self.nick, self.user, self.host)
    }

    /// Change the username and the realname of the client.
    ///
    /// This function does not change the connection state.
    pub fn set_user_real(&mut self, user: &str, real: &str) {
        self.user.clear();
        self.user.push_str(user);
        self.real.clear();
        self.real.push_str(real);
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_registered(&self) -> bool {
        self.state.is_registered()
    }

    //
    // User modes
    //

    pub fn has_mode(&self, mode: char) -> bool {
        self.modes.contains(&mode)
    }

    pub fn is_invisible(&self) -> bool {
        self.has_mode('i')
    }

    pub fn receives_wallops(&self) -> bool {
        self.has_mode('w')
    }

    pub fn is_operator(&self) -> bool {
        self.has_mode('o')
    }

    /// Grants operator status, outside of a MODE query (OPER does this).
    pub fn grant_operator(&mut self) {
        if !self.has_mode('o') {
            self.modes.push('o');
        }
    }

    /// Applies a user mode change, returning whether the mode set actually changed.
    pub fn apply_mode_change(&mut self, change: modes::UserModeChange) -> bool {
        let symbol = change.symbol();
        if change.value() {
            if self.has_mode(symbol) {
                false
            } else {
                self.modes.push(symbol);
                true
            }
        } else if let Some(pos) = self.modes.iter().position(|&m| m == symbol) {
            self.modes.remove(pos);
            true
        } else {
            false
        }
    }

    /// The canonical mode string, flags in the order they were set.
    pub fn modes(&self) -> String {
        let mut res = String::with_capacity(1 + self.modes.len());
        res.push('+');
        res.extend(&self.modes);
        res
    }
}

/// A state machine that represent the connection with a client. It keeps track of what message the
/// client can send.
///
/// For example, a client that has sent a "NICK" message only cannot send a "JOIN" message.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ConnectionState {
    /// The client just connected to the server, and must register. Its registration is kept track
    /// of by `RegistrationState`.
    ConnectionEstablished(RegistrationState),

    /// The client is registered, and can send any command except "USER".
    Registered,

    /// The peer identified itself as a server with "SERVER"; it now speaks the link protocol.
    ServerLink,
}

impl ConnectionState {
    /// The connection state of a client that has just connected to the server.
    pub fn new() -> ConnectionState {
        ConnectionState::ConnectionEstablished(RegistrationState::Stranger)
    }

    /// Given a connection state and a command, returns the next connection state after a client
    /// has sent the command, or a reply code to send the client if this command cannot be issued.
    ///
    /// # Example
    ///
    /// ```rust
    /// use kaede::client::{ConnectionState, RegistrationState};
    /// use kaede::message::{Command, rpl};
    ///
    /// let state = ConnectionState::ConnectionEstablished(RegistrationState::NickGiven);
    /// assert_eq!(state.apply(Command::User), Ok(ConnectionState::Registered));
    ///
    /// let state = ConnectionState::Registered;
    /// assert_eq!(state.apply(Command::User), Err(rpl::ERR_ALREADYREGISTRED));
    /// ```
    pub fn apply(self, cmd: Command) -> Result<ConnectionState, Reply> {
        match self {
            ConnectionState::ConnectionEstablished(reg) => match cmd {
                Command::Pass | Command::Ping | Command::Pong | Command::Quit => Ok(self),
                Command::Server => Ok(ConnectionState::ServerLink),
                _ => {
                    let reg = reg.apply(cmd)?;
                    if reg.is_registered() {
                        Ok(ConnectionState::Registered)
                    } else {
                        Ok(ConnectionState::ConnectionEstablished(reg))
                    }
                },
            },
            ConnectionState::Registered => match cmd {
                Command::User | Command::Pass | Command::Server => Err(rpl::ERR_ALREADYREGISTRED),
                _ => Ok(ConnectionState::Registered),
            },
            ConnectionState::ServerLink => match cmd {
                Command::User => Err(rpl::ERR_ALREADYREGISTRED),
                _ => Ok(ConnectionState::ServerLink),
            },
        }
    }

    /// True iff self == ConnectionState::Registered.
    pub fn is_registered(&self) -> bool {
        matches!(self, ConnectionState::Registered)
    }

    pub fn is_server_link(&self) -> bool {
        matches!(self, ConnectionState::ServerLink)
    }
}

impl Default for ConnectionState {
    fn default() -> ConnectionState {
        ConnectionState::new()
    }
}

/// A state machine that represents a registration (process of sending "NICK" and "USER").
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RegistrationState {
    /// The client hasn't began the registration.
    Stranger,

    /// The client has sent one or more "NICK", but has not sent any "USER".
    NickGiven,

    /// The client has sent a "USER", but has not sent any "NICK".
    UserGiven,

    /// The client has sent a "USER" and a "NICK", and completed its registration.
    Registered,
}

impl RegistrationState {
    /// Given a registration state and a command, returns the next registration state after the
    /// client has sent the command, or a reply code if the command cannot be sent.
    pub fn apply(self, cmd: Command) -> Result<Self, Reply> {
        match cmd {
            Command::Nick => self.apply_nick(),
            Command::User => self.apply_user(),
            _ => Err(rpl::ERR_NOTREGISTERED),
        }
    }

    /// True iff self == RegistrationState::Registered.
    pub fn is_registered(&self) -> bool {
        matches!(self, RegistrationState::Registered)
    }

    /// Apply a "NICK" message.
    fn apply_nick(self) -> Result<Self, Reply> {
        match self {
            RegistrationState::Stranger |
            RegistrationState::NickGiven => Ok(RegistrationState::NickGiven),
            RegistrationState::UserGiven |
            RegistrationState::Registered => Ok(RegistrationState::Registered),
        }
    }

    /// Apply a "USER" message.
    fn apply_user(self) -> Result<Self, Reply> {
        match self {
            RegistrationState::Stranger => Ok(RegistrationState::UserGiven),
            RegistrationState::NickGiven => Ok(RegistrationState::Registered),
            _ => Err(rpl::ERR_ALREADYREGISTRED),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modes::UserModeChange;

    fn local_client() -> (Client, mpsc::UnboundedReceiver<MessageQueueItem>) {
        let (queue, outgoing) = mpsc::unbounded_channel();
        let client = Client::new(queue, "127.0.0.1".to_owned(), "test.server".to_owned());
        (client, outgoing)
    }

    #[test]
    fn test_registration_order_does_not_matter() {
        let state = ConnectionState::new();
        let state = state.apply(Command::Nick).unwrap();
        let state = state.apply(Command::Pass).unwrap();
        let state = state.apply(Command::User).unwrap();
        assert!(state.is_registered());

        let state = ConnectionState::new();
        let state = state.apply(Command::User).unwrap();
        let state = state.apply(Command::Nick).unwrap();
        assert!(state.is_registered());
    }

    #[test]
    fn test_commands_rejected_before_registration() {
        let state = ConnectionState::new();
        assert_eq!(state.apply(Command::Join), Err(rpl::ERR_NOTREGISTERED));
        assert_eq!(state.apply(Command::PrivMsg), Err(rpl::ERR_NOTREGISTERED));
        assert!(state.apply(Command::Quit).is_ok());
        assert!(state.apply(Command::Pass).is_ok());
    }

    #[test]
    fn test_server_command_switches_to_link() {
        let state = ConnectionState::new();
        let state = state.apply(Command::Server).unwrap();
        assert!(state.is_server_link());
        assert!(state.apply(Command::Nick).is_ok());
        assert_eq!(state.apply(Command::User), Err(rpl::ERR_ALREADYREGISTRED));
    }

    #[test]
    fn test_mode_string_keeps_insertion_order() {
        let (mut client, _out) = local_client();
        assert!(client.apply_mode_change(UserModeChange::Wallops(true)));
        assert!(client.apply_mode_change(UserModeChange::Invisible(true)));
        assert!(!client.apply_mode_change(UserModeChange::Wallops(true)));
        assert_eq!(client.modes(), "+wi");
        assert!(client.apply_mode_change(UserModeChange::Wallops(false)));
        assert_eq!(client.modes(), "+i");
    }

    #[test]
    fn test_send_to_remote_is_noop() {
        let client = Client::new_remote("nick", "user", "Real Name", "remote.host",
                                        "other.server".to_owned(), 1);
        assert!(!client.is_local());
        assert_eq!(client.send("PING :hello\r\n".to_owned()), Ok(()));
    }

    #[test]
    fn test_send_fails_when_queue_closed() {
        let (client, outgoing) = local_client();
        assert!(client.send("PING :hello\r\n".to_owned()).is_ok());
        drop(outgoing);
        assert!(client.send("PING :hello\r\n".to_owned()).is_err());
    }
}
