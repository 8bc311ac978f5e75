//! Message parsing and building.

pub use rpl::Reply;

/// The maximum length of a message, in bytes.
///
/// The transport drops connections that send longer lines, so `Message::parse` never sees them.
/// `ResponseBuffer` also reserves this much to avoid multiple allocations per message.
pub const MAX_MESSAGE_LENGTH: usize = 512;

/// The number of elements in `Message::params`.
pub const MAX_PARAMS: usize = 15;

/// The list of IRC replies.
///
/// All replies must have the client's nick as first parameter.
///
/// Source: <https://tools.ietf.org/html/rfc2812.html#section-5>
pub mod rpl {
    pub type Reply = &'static str;

    pub const WELCOME: Reply  = "001";  // :Welcome message
    pub const YOURHOST: Reply = "002";  // :Your host is...
    pub const CREATED: Reply  = "003";  // :This server was created...
    pub const MYINFO: Reply   = "004";  // <servername> <version> <umodes> <chan modes>

    pub const UMODEIS: Reply = "221";  // <modes>

    pub const AWAY: Reply          = "301";  // <nick> :<away message>
    pub const UNAWAY: Reply        = "305";  // :You are no longer marked as being away
    pub const NOWAWAY: Reply       = "306";  // :You have been marked as being away
    pub const WHOISUSER: Reply     = "311";  // <nick> <user> <host> * :<realname>
    pub const WHOISSERVER: Reply   = "312";  // <nick> <server> :<server info>
    pub const WHOISOPERATOR: Reply = "313";  // <nick> :is an IRC operator
    pub const WHOWASUSER: Reply    = "314";  // <nick> <user> <host> * :<realname>
    pub const ENDOFWHO: Reply      = "315";  // <name> :End of WHO list
    pub const WHOISIDLE: Reply     = "317";  // <nick> <integer> <integer> :seconds idle, signon time
    pub const ENDOFWHOIS: Reply    = "318";  // <nick> :End of WHOIS list
    pub const WHOISCHANNELS: Reply = "319";  // <nick> :*( (@/+) <channel> " " )
    pub const LIST: Reply          = "322";  // <channel> <# of visible members> <topic>
    pub const LISTEND: Reply       = "323";  // :End of list
    pub const CHANNELMODEIS: Reply = "324";  // <channel> <modes> <mode params>
    pub const NOTOPIC: Reply       = "331";  // <channel> :No topic set
    pub const TOPIC: Reply         = "332";  // <channel> <topic>
    pub const INVITING: Reply      = "341";  // <channel> <nick>
    pub const VERSION: Reply       = "351";  // <version> <servername> :<comments>
    pub const WHOREPLY: Reply      = "352";  // <channel> <user> <host> <server> <nick> "H"/"G" :<hopcount> <realname>
    pub const NAMREPLY: Reply      = "353";  // <=/*/@> <channel> :1*(@/ /+user)
    pub const ENDOFNAMES: Reply    = "366";  // <channel> :End of names list
    pub const BANLIST: Reply       = "367";  // <channel> <ban mask> <who set it> <timestamp>
    pub const ENDOFBANLIST: Reply  = "368";  // <channel> :End of ban list
    pub const ENDOFWHOWAS: Reply   = "369";  // <nick> :End of WHOWAS
    pub const MOTD: Reply          = "372";  // :- <text>
    pub const MOTDSTART: Reply     = "375";  // :- <servername> Message of the day -
    pub const ENDOFMOTD: Reply     = "376";  // :End of MOTD command
    pub const YOUREOPER: Reply     = "381";  // :You are now an operator
    pub const TIME: Reply          = "391";  // <servername> :<time in whatever format>

    pub const ERR_NOSUCHNICK: Reply       = "401";  // <nick> :No such nick/channel
    pub const ERR_NOSUCHSERVER: Reply     = "402";  // <server> :No such server
    pub const ERR_NOSUCHCHANNEL: Reply    = "403";  // <channel> :No such channel
    pub const ERR_CANNOTSENDTOCHAN: Reply = "404";  // <channel> :Cannot send to channel
    pub const ERR_WASNOSUCHNICK: Reply    = "406";  // <nick> :There was no such nickname
    pub const ERR_NORECIPIENT: Reply      = "411";  // :No recipient given
    pub const ERR_NOTEXTTOSEND: Reply     = "412";  // :No text to send
    pub const ERR_NOMOTD: Reply           = "422";  // :MOTD file missing
    pub const ERR_NONICKNAMEGIVEN: Reply  = "431";  // :No nickname given
    pub const ERR_ERRONEUSNICKNAME: Reply = "432";  // <nick> :Erroneous nickname
    pub const ERR_NICKNAMEINUSE: Reply    = "433";  // <nick> :Nickname in use
    pub const ERR_USERNOTINCHANNEL: Reply = "441";  // <nick> <channel> :User not in channel
    pub const ERR_NOTONCHANNEL: Reply     = "442";  // <channel> :You're not on that channel
    pub const ERR_USERONCHANNEL: Reply    = "443";  // <user> <channel> :is already on channel
    pub const ERR_NOTREGISTERED: Reply    = "451";  // :You have not registered
    pub const ERR_NEEDMOREPARAMS: Reply   = "461";  // <command> :Not enough parameters
    pub const ERR_ALREADYREGISTRED: Reply = "462";  // :Already registered
    pub const ERR_PASSWDMISMATCH: Reply   = "464";  // :Password incorrect
    pub const ERR_KEYSET: Reply           = "467";  // <channel> :Channel key already set
    pub const ERR_CHANNELISFULL: Reply    = "471";  // <channel> :Cannot join channel (+l)
    pub const ERR_UNKNOWNMODE: Reply      = "472";  // <char> :Don't know this mode for <channel>
    pub const ERR_INVITEONLYCHAN: Reply   = "473";  // <channel> :Cannot join channel (+i)
    pub const ERR_BANNEDFROMCHAN: Reply   = "474";  // <channel> :Cannot join channel (+b)
    pub const ERR_BADCHANKEY: Reply       = "475";  // <channel> :Cannot join channel (+k)
    pub const ERR_NOPRIVILEGES: Reply     = "481";  // :Permission denied
    pub const ERR_CHANOPRIVSNEEDED: Reply = "482";  // <channel> :You're not an operator

    pub const ERR_UMODEUNKNOWNFLAG: Reply = "501";  // :Unknown mode flag
    pub const ERR_USERSDONTMATCH: Reply   = "502";  // :Can't change mode for other users
}

macro_rules! commands {
    ( $( $cmd:ident => $s:expr, $n:expr; )* ) => {
        /// The commands kaede supports, generated by `commands!`.
        ///
        /// Commands outside this list stay plain strings in `Message::command`.
        #[derive(Clone, Copy, Debug, PartialEq)]
        pub enum Command {
            $( $cmd, )*
            Reply(Reply),
        }

        impl Command {
            /// Resolves a command string, ignoring case.
            pub fn parse(s: &str) -> Option<Command> {
                $( if s.eq_ignore_ascii_case($s) {
                    Some(Command::$cmd)
                } else )* {
                    None
                }
            }

            /// How many parameters the command needs at least.  More are accepted.
            pub fn required_params(&self) -> usize {
                match self {
                $(
                    Command::$cmd => $n,
                )*
                    Command::Reply(_) => 0,
                }
            }

            /// Returns the command string, in its canonical uppercase form.
            pub fn as_str(&self) -> &'static str {
                match self {
                $(
                    Command::$cmd => $s,
                )*
                    Command::Reply(s) => s,
                }
            }
        }

        impl From<&'static str> for Command {
            /// Wraps a reply code in `Command::Reply`, so that `ResponseBuffer` methods accept
            /// both `Command`s and `Reply`s.
            fn from(reply: &'static str) -> Command {
                Command::Reply(reply)
            }
        }
    }
}

commands! {
    Away => "AWAY", 0;
    Connect => "CONNECT", 1;
    Invite => "INVITE", 2;
    Join => "JOIN", 1;
    Kick => "KICK", 2;
    List => "LIST", 0;
    Mode => "MODE", 1;
    Motd => "MOTD", 0;
    Names => "NAMES", 0;
    Nick => "NICK", 1;
    Notice => "NOTICE", 2;
    Oper => "OPER", 2;
    Part => "PART", 1;
    Pass => "PASS", 1;
    Ping => "PING", 1;
    Pong => "PONG", 0;
    PrivMsg => "PRIVMSG", 2;
    Quit => "QUIT", 0;
    Server => "SERVER", 4;
    Time => "TIME", 0;
    Topic => "TOPIC", 1;
    User => "USER", 4;
    Version => "VERSION", 0;
    Wallops => "WALLOPS", 1;
    Who => "WHO", 0;
    Whois => "WHOIS", 1;
    Whowas => "WHOWAS", 1;
}

/// An IRC message.
///
/// See `Message::parse` for documentation on how to read IRC messages, and `ResponseBuffer` for
/// how to create messages.
///
/// See the RFC 2812 for a complete description of IRC messages:
/// <https://tools.ietf.org/html/rfc2812.html#section-2.3>.
#[derive(Debug)]
pub struct Message<'a> {
    /// The prefix of the message, without its leading `:`.
    ///
    /// Only set on echoed and server-to-server messages.
    pub prefix: Option<&'a str>,

    /// The command, or `Err(s)` with the raw command string when it is not one kaede knows.
    pub command: Result<Command, &'a str>,

    /// The number of valid elements at the start of `Message::params`.
    pub num_params: usize,

    /// The parameters.  Elements past `num_params` are empty strings.
    pub params: [&'a str; MAX_PARAMS],
}

impl<'a> Message<'a> {
    /// Parses one IRC line.
    ///
    /// The line is split on its first `" :"` into a head and a trailer; the head is split on
    /// spaces into the command and its positional parameters, and the trailer (which may contain
    /// spaces) is appended as the last parameter.  Command matching ignores case.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use kaede::message::{Command, Message};
    /// let privmsg = Message::parse(":ada PRIVMSG #boat :hello, crew!\r\n").unwrap();
    ///
    /// assert_eq!(privmsg.prefix, Some("ada"));
    /// assert_eq!(privmsg.command, Ok(Command::PrivMsg));
    /// assert_eq!(privmsg.num_params, 2);
    /// assert_eq!(privmsg.params[0], "#boat");
    /// assert_eq!(privmsg.params[1], "hello, crew!");
    /// ```
    ///
    /// Unknown commands keep their raw string:
    ///
    /// ```rust
    /// # use kaede::message::{Command, Message};
    /// let unknown = Message::parse("ISON ada\r\n").unwrap();
    ///
    /// assert_eq!(unknown.prefix, None);
    /// assert_eq!(unknown.command, Err("ISON"));
    /// assert_eq!(unknown.num_params, 1);
    /// assert_eq!(unknown.params[0], "ada");
    /// ```
    ///
    /// Returns `None` when the line is empty or has a prefix but no command.
    pub fn parse(s: &'a str) -> Option<Message<'a>> {
        let buf = s.trim();
        if buf.is_empty() {
            return None;
        }

        let (head, trailer) = match buf.find(" :") {
            Some(index) => (&buf[..index], Some(&buf[index + 2..])),
            None => (buf, None),
        };

        let mut words = head.split(' ').filter(|w| !w.is_empty());
        let mut first = words.next()?;
        let prefix = if let Some(stripped) = strip_colon(first) {
            first = words.next()?;
            Some(stripped)
        } else {
            None
        };
        let command = Command::parse(first).ok_or(first);

        let mut params = [""; MAX_PARAMS];
        let mut num_params = 0;
        for word in words {
            if num_params == MAX_PARAMS {
                break;
            }
            params[num_params] = word;
            num_params += 1;
        }
        if let Some(trailer) = trailer {
            if num_params < MAX_PARAMS {
                params[num_params] = trailer;
                num_params += 1;
            }
        }

        Some(Message { prefix, command, num_params, params })
    }

    /// Whether the message carries at least the parameters its command requires.
    pub fn has_enough_params(&self) -> bool {
        match self.command {
            Ok(cmd) => cmd.required_params() <= self.num_params,
            Err(_) => false,
        }
    }
}

fn strip_colon(word: &str) -> Option<&str> {
    if word.starts_with(':') {
        Some(&word[1..])
    } else {
        None
    }
}

/// Helper to build an IRC message.
///
/// Created by `ResponseBuffer::message` and `ResponseBuffer::prefixed_message`.
pub struct MessageBuffer<'a> {
    buf: &'a mut String,
}

impl<'a> MessageBuffer<'a> {
    fn new<C>(buf: &'a mut String, command: C) -> MessageBuffer<'a>
        where C: Into<Command>
    {
        buf.push_str(command.into().as_str());
        MessageBuffer { buf }
    }

    fn with_prefix<C>(buf: &'a mut String, prefix: &str, command: C) -> MessageBuffer<'a>
        where C: Into<Command>
    {
        buf.push(':');
        buf.push_str(prefix);
        buf.push(' ');
        buf.push_str(command.into().as_str());
        MessageBuffer { buf }
    }

    /// Appends a middle parameter.
    ///
    /// The parameter is trimmed first; when it trims to nothing, nothing is appended.  The caller
    /// must make sure it contains no inner whitespace or newline.
    pub fn param(self, param: &str) -> MessageBuffer<'a> {
        let param = param.trim();
        if param.is_empty() {
            return self;
        }
        self.buf.push(' ');
        self.buf.push_str(param);
        self
    }

    /// Appends the trailing parameter and finishes the message.
    ///
    /// Unlike `MessageBuffer::param`, the parameter is appended verbatim, even when empty.  The
    /// caller must make sure it contains no newline.
    pub fn trailing_param(self, param: &str) {
        self.buf.push(' ');
        self.buf.push(':');
        self.buf.push_str(param);
    }

    /// Starts a middle parameter and exposes the underlying buffer, for piecewise formatting.
    pub fn raw_param(&mut self) -> &mut String {
        self.buf.push(' ');
        self.buf
    }

    /// Starts the trailing parameter and exposes the underlying buffer.
    pub fn raw_trailing_param(&mut self) -> &mut String {
        self.buf.push(' ');
        self.buf.push(':');
        self.buf
    }
}

impl<'a> Drop for MessageBuffer<'a> {
    /// Terminates the message with "\r\n".
    fn drop(&mut self) {
        self.buf.push('\r');
        self.buf.push('\n');
    }
}

/// A growable buffer of outgoing IRC messages.
///
/// Handlers batch all the replies to one incoming message in a single `ResponseBuffer`, then
/// build it into one `String` for the write queue.
///
/// # Example
///
/// ```rust
/// # use kaede::message::{Command, ResponseBuffer, rpl};
/// let mut response = ResponseBuffer::new();
///
/// response.message(Command::Topic).param("#hall");
/// response.prefixed_message("kaede.dev", rpl::TOPIC)
///     .param("nickname")
///     .param("#hall")
///     .trailing_param("Welcome to new users!");
///
/// let result = response.build();
/// assert_eq!(&result, "TOPIC #hall\r\n:kaede.dev 332 nickname #hall :Welcome to new users!\r\n");
/// ```
#[derive(Debug)]
pub struct ResponseBuffer {
    buf: String,
}

impl Default for ResponseBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseBuffer {
    /// Creates a `ResponseBuffer`.  Does not allocate.
    pub fn new() -> Self {
        Self { buf: String::new() }
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Starts a message without a prefix.
    pub fn message<C>(&mut self, command: C) -> MessageBuffer<'_>
        where C: Into<Command>
    {
        self.buf.reserve(MAX_MESSAGE_LENGTH);
        MessageBuffer::new(&mut self.buf, command)
    }

    /// Starts a message with the given prefix.
    pub fn prefixed_message<C>(&mut self, prefix: &str, command: C) -> MessageBuffer<'_>
        where C: Into<Command>
    {
        self.buf.reserve(MAX_MESSAGE_LENGTH);
        MessageBuffer::with_prefix(&mut self.buf, prefix, command)
    }

    /// Consumes the `ResponseBuffer` and returns the underlying `String`.
    pub fn build(self) -> String {
        self.buf
    }
}
