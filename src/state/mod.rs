//! Shared state and API to handle incoming commands.
//!
//! This module is split in several files:
//!
//! - `mod.rs`: public API of the server state and send utilities
//! - `rfc2812.rs`: handlers for client messages
//! - `link.rs`: the server-to-server link protocol

use crate::channel::Channel;
use crate::client::{Client, MessageQueue, MessageQueueItem};
use crate::config;
use crate::lines;
use crate::message::{Command, Message, Reply, ResponseBuffer, rpl};
use crate::modes;
use crate::util::{time, time_str};
use crate::{auth, net};
use kaede_unicase::{u, UniCase};
use slab::Slab;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::{cmp, io};
use tokio::sync::Mutex;

pub use link::RemoteServer;

mod link;
mod rfc2812;
#[cfg(test)]
pub(crate) mod test;

const SERVER_VERSION: &str = concat!(env!("CARGO_PKG_NAME"), "-", env!("CARGO_PKG_VERSION"));
const MAX_CHANNEL_NAME_LENGTH: usize = 50;

/// The token this server announces in its own SERVER introduction.
const LOCAL_TOKEN: u32 = 1;

pub type ClientId = usize;
type ChannelMap = HashMap<UniCase<String>, Channel>;
type ServerMap = HashMap<UniCase<String>, RemoteServer>;
type HandlerResult = Result<(), ()>;

pub fn is_valid_channel_name(s: &str) -> bool {
    // https://tools.ietf.org/html/rfc2811.html#section-2.1
    let ctrl_g = 7 as char;
    !s.is_empty()
        && s.len() <= MAX_CHANNEL_NAME_LENGTH
        && {
            let first = s.as_bytes()[0];
            first == b'#' || first == b'&' || first == b'!' || first == b'+'
        }
        && s.chars().all(|c| c != ' ' && c != ',' && c != ctrl_g && c != ':')
}

pub fn is_valid_nickname(s: &str, max_len: usize) -> bool {
    let s = s.as_bytes();
    let is_valid_nickname_char = |&c: &u8| {
        c.is_ascii_alphanumeric()
            // "[", "]", "\", "`", "_", "^", "{", "|", "}"
            || (0x5b..=0x60).contains(&c)
            || (0x7b..=0x7d).contains(&c)
    };
    !s.is_empty()
        && s.len() <= max_len
        && s.iter().all(is_valid_nickname_char)
        && s[0].is_ascii_alphabetic()
}

/// A WHOWAS record, captured when a user disconnects.
pub struct HistoryEntry {
    pub nick: String,
    pub user: String,
    pub real: String,
    pub host: String,
    pub server: String,
    pub at: u64,
}

/// Work that needs an await point.
///
/// Handlers cannot await while the state lock is held, so they surface these actions instead;
/// `State::handle_message` runs them once the lock is released.
pub enum Pending {
    /// Connection password check.
    Pass { id: ClientId, hash: String, given: String },

    /// OPER credentials check.
    Oper { id: ClientId, hash: String, given: String },

    /// Incoming link password check.
    LinkPass { id: ClientId, hash: String, given: String },

    /// Outbound server link, requested by CONNECT.
    Connect { link: config::Link },
}

/// State of an IRC network.
///
/// This is just an `Arc` to the real data, so it's cheap to clone and clones share the same
/// data.
#[derive(Clone)]
pub struct State(pub(crate) Arc<Mutex<StateInner>>);

impl State {
    pub fn new(config: config::State) -> Self {
        Self(Arc::new(Mutex::new(StateInner::new(config))))
    }

    /// Called when the connection to a new peer is created.
    ///
    /// `accepts_links` is set for connections accepted on the link listener; they skip the
    /// connection password gate, since their PASS carries a link password instead.
    pub async fn peer_joined(&self, host: String, queue: MessageQueue,
                             accepts_links: bool) -> ClientId {
        self.0.lock().await.peer_joined(host, queue, accepts_links)
    }

    /// Called when the connection to a peer is closed.
    pub async fn peer_quit(&self, id: ClientId, err: Option<io::Error>) {
        let mut inner = self.0.lock().await;
        inner.peer_quit(id, err);
        inner.reap_dead();
    }

    /// Called when the reverse lookup of a peer's address resolves.
    pub async fn peer_resolved(&self, id: ClientId, hostname: String) {
        if let Some(client) = self.0.lock().await.clients.get_mut(id) {
            if !client.is_registered() {
                client.set_host(&hostname);
            }
        }
    }

    /// Called when a connected peer sends a line.
    ///
    /// Handlers run to completion under the state lock; password checks and outbound connects
    /// are surfaced as `Pending` actions and run here, between lock acquisitions.
    pub async fn handle_message(&self, id: ClientId, line: &str) {
        let mut queue = {
            let mut inner = self.0.lock().await;
            let pending = inner.handle_line(id, line);
            inner.reap_dead();
            pending
        };

        while !queue.is_empty() {
            let batch: Vec<Pending> = queue.drain(..).collect();
            for action in batch {
                match action {
                    Pending::Pass { id, hash, given } => {
                        let ok = auth::verify(hash, given).await;
                        let mut inner = self.0.lock().await;
                        queue.extend(inner.pass_result(id, ok));
                        inner.reap_dead();
                    }
                    Pending::Oper { id, hash, given } => {
                        let ok = auth::verify(hash, given).await;
                        let mut inner = self.0.lock().await;
                        queue.extend(inner.oper_result(id, ok));
                        inner.reap_dead();
                    }
                    Pending::LinkPass { id, hash, given } => {
                        let ok = auth::verify(hash, given).await;
                        let mut inner = self.0.lock().await;
                        queue.extend(inner.link_pass_result(id, ok));
                        inner.reap_dead();
                    }
                    Pending::Connect { link } => {
                        net::connect_link(self.clone(), link);
                    }
                }
            }
        }
    }

    /// Registers an outbound link connection and sends this server's PASS/SERVER
    /// introduction.
    pub async fn outbound_link(&self, queue: MessageQueue, link: config::Link) -> ClientId {
        let mut inner = self.0.lock().await;
        let id = inner.outbound_link(queue, link);
        inner.reap_dead();
        id
    }

    /// Pings idle clients and drops timed-out ones.  Called at a fixed interval.
    pub async fn ping_sweep(&self) {
        self.0.lock().await.ping_sweep();
    }

    /// Applies a reloaded configuration.
    pub async fn rehash(&self, config: config::State) {
        self.0.lock().await.rehash(config);
    }
}

/// The actual shared data (state) of the IRC server.
pub(crate) struct StateInner {
    /// The domain of the server. This string is used as a prefix for replies sent to clients.
    domain: String,

    /// The name of the IRC network, sent in the welcome message.
    network: String,

    /// One-line description of the server, sent in SERVER introductions and WHOIS replies.
    description: String,

    /// Local users, remote users and link peer connections, identified by their slab index.
    clients: Slab<Client>,

    channels: ChannelMap,

    /// Known servers, keyed by name.  Direct peers and transitively-learned ones.
    servers: ServerMap,

    /// WHOWAS records, newest first, bounded by `whowas_limit`.
    history: VecDeque<HistoryEntry>,

    /// The formatted time when this instance is created. It is sent to the client when they
    /// register (in a "003 RPL_CREATED" reply).
    created_at: String,

    /// The message of the day.
    motd: Option<String>,

    /// Argon2 hash of the connection password.  When set, clients must issue a matching PASS
    /// command before anything else.
    password: Option<String>,

    /// A list of credentials that are valid OPER parameters.
    opers: Vec<config::Oper>,

    /// The configured link peers.
    links: Vec<config::Link>,

    ping_timeout: u64,
    whowas_limit: usize,
    nicklen: usize,

    /// Clients whose queue failed during a fan-out.  Recorded here and reaped after the
    /// current handler returns, so member lists are never mutated mid-iteration.
    dead: RefCell<Vec<ClientId>>,

    /// Async work surfaced by handlers, drained by `State::handle_message`.
    pending: Vec<Pending>,
}

impl StateInner {
    pub fn new(config: config::State) -> Self {
        let mut channels = ChannelMap::new();
        for def in &config.channels {
            if !is_valid_channel_name(&def.name) {
                log::warn!("Ignoring default channel with invalid name {:?}", def.name);
                continue;
            }
            let mut channel = Channel::new(&def.name);
            if !def.topic.is_empty() {
                channel.topic = Some(def.topic.clone());
            }
            channels.insert(UniCase(def.name.clone()), channel);
        }
        Self {
            domain: config.domain,
            network: config.network,
            description: config.description,
            clients: Slab::new(),
            channels,
            servers: HashMap::new(),
            history: VecDeque::new(),
            created_at: time_str(),
            motd: config.motd,
            password: config.password,
            opers: config.opers,
            links: config.links,
            ping_timeout: config.ping_timeout,
            whowas_limit: config.whowas_limit,
            nicklen: config.nicklen,
            dead: RefCell::new(Vec::new()),
            pending: Vec::new(),
        }
    }

    pub fn peer_joined(&mut self, host: String, queue: MessageQueue,
                       accepts_links: bool) -> ClientId {
        let mut client = Client::new(queue, host, self.domain.clone());
        client.on_link_port = accepts_links;
        let id = self.clients.insert(client);
        log::debug!("{}: Connected", id);
        id
    }

    pub fn peer_quit(&mut self, id: ClientId, err: Option<io::Error>) {
        if !self.clients.contains(id) {
            return;
        }
        log::debug!("{}: Disconnected", id);
        let client = self.clients.remove(id);
        self.remove_client(id, client, err.map(|err| err.to_string()));
    }

    /// Fans out the QUIT notice, removes the client from every channel, prunes the channels it
    /// emptied, and records the WHOWAS entry.
    fn remove_client(&mut self, id: ClientId, client: Client, reason: Option<String>) {
        let mut response = ResponseBuffer::new();
        {
            let msg = response.prefixed_message(&client.full_name(), Command::Quit);
            if let Some(ref reason) = reason {
                msg.trailing_param(reason);
            }
        }
        let msg = MessageQueueItem::from(response);

        for channel in self.channels.values() {
            if channel.members.contains_key(&id) {
                for member in channel.members.keys() {
                    if *member != id {
                        self.send(*member, msg.clone());
                    }
                }
            }
        }

        // Channels the client emptied are dropped; channels that were already empty (the
        // configured defaults) stay.
        self.channels.retain(|_, channel| {
            let was_member = channel.members.remove(&id).is_some();
            channel.remove_invite(client.nick());
            !was_member || !channel.members.is_empty()
        });

        if client.is_registered() && !client.state().is_server_link() {
            self.history.push_front(HistoryEntry {
                nick: client.nick().to_owned(),
                user: client.user().to_owned(),
                real: client.real().to_owned(),
                host: client.host().to_owned(),
                server: client.server.clone(),
                at: time(),
            });
            self.history.truncate(self.whowas_limit);
            if client.is_local() {
                self.relay_to_links(None, msg);
            }
        }

        if client.state().is_server_link() {
            self.unlink_server(id, &client, reason.as_deref());
        }
    }

    /// Entry point for a raw line from a connected peer.
    ///
    /// Lines received while a password check is in flight, or before the connection password
    /// has been accepted, are held and replayed in order once PASS succeeds.
    pub fn handle_line(&mut self, id: ClientId, line: &str) -> Vec<Pending> {
        match self.clients.get_mut(id) {
            Some(client) => {
                client.last_ping = time();
                if client.awaiting_verify {
                    client.held_lines.push(line.to_owned());
                    return Vec::new();
                }
            }
            None => return Vec::new(),
        }

        let msg = match Message::parse(line) {
            Some(msg) => msg,
            None => return Vec::new(),
        };

        let gated = {
            let client = &self.clients[id];
            self.password.is_some()
                && !client.on_link_port
                && !client.password_accepted
                && !client.is_registered()
                && !matches!(msg.command, Ok(Command::Pass) | Ok(Command::Quit))
        };
        if gated {
            self.clients[id].held_lines.push(line.to_owned());
            return Vec::new();
        }

        self.handle_message(id, msg);
        std::mem::take(&mut self.pending)
    }

    pub fn handle_message(&mut self, id: ClientId, msg: Message<'_>) {
        let client = match self.clients.get(id) {
            Some(client) => client,
            None => return,
        };

        let command = match msg.command {
            Ok(command) => command,
            Err(unknown) => {
                // Tolerate unknown and future commands.
                log::debug!("{}: {:?}: unknown command, dropped", id, unknown);
                return;
            }
        };

        if client.state().is_server_link() {
            self.handle_server_message(id, command, &msg);
            return;
        }

        if !msg.has_enough_params() {
            log::debug!("{}: {:?}: not enough parameters", id, command);
            let mut response = ResponseBuffer::new();
            match command {
                Command::Nick | Command::Whois | Command::Whowas => {
                    response.prefixed_message(&self.domain, rpl::ERR_NONICKNAMEGIVEN)
                        .param(client.nick())
                        .trailing_param(lines::NO_NICKNAME_GIVEN);
                }
                // NOTICE never generates error replies.
                Command::Notice => return,
                Command::PrivMsg if msg.num_params == 0 => {
                    response.prefixed_message(&self.domain, rpl::ERR_NORECIPIENT)
                        .param(client.nick())
                        .trailing_param(lines::NO_RECIPIENT);
                }
                Command::PrivMsg => {
                    response.prefixed_message(&self.domain, rpl::ERR_NOTEXTTOSEND)
                        .param(client.nick())
                        .trailing_param(lines::NO_TEXT_TO_SEND);
                }
                _ => {
                    response.prefixed_message(&self.domain, rpl::ERR_NEEDMOREPARAMS)
                        .param(client.nick())
                        .param(command.as_str())
                        .trailing_param(lines::NEED_MORE_PARAMS);
                }
            }
            self.send(id, MessageQueueItem::from(response));
            return;
        }

        if !client.can_issue_command(command) {
            log::debug!("{}: {:?}: cannot issue command in this state", id, command);
            let mut response = ResponseBuffer::new();
            if client.is_registered() || command == Command::User {
                response.prefixed_message(&self.domain, rpl::ERR_ALREADYREGISTRED)
                    .param(client.nick())
                    .trailing_param(lines::ALREADY_REGISTERED);
            } else {
                response.prefixed_message(&self.domain, rpl::ERR_NOTREGISTERED)
                    .param(client.nick())
                    .trailing_param(lines::NOT_REGISTERED);
            }
            self.send(id, MessageQueueItem::from(response));
            return;
        }

        let ps = msg.params;
        let n = msg.num_params;
        let cmd_result = match command {
            Command::Away => self.cmd_away(id, ps[0]),
            Command::Connect => self.cmd_connect(id, ps[0], ps[1]),
            Command::Invite => self.cmd_invite(id, ps[0], ps[1]),
            Command::Join => self.cmd_join(id, ps[0], ps[1]),
            Command::Kick => self.cmd_kick(id, ps[0], ps[1], ps[2]),
            Command::List => self.cmd_list(id, ps[0]),
            Command::Mode => self.cmd_mode(id, ps[0], ps[1], &ps[2..cmp::max(2, n)]),
            Command::Motd => self.cmd_motd(id),
            Command::Names => self.cmd_names(id, ps[0]),
            Command::Nick => self.cmd_nick(id, ps[0]),
            Command::Notice => self.cmd_notice(id, ps[0], ps[1]),
            Command::Oper => self.cmd_oper(id, ps[0], ps[1]),
            Command::Part => self.cmd_part(id, ps[0], ps[1]),
            Command::Pass => self.cmd_pass(id, ps[0]),
            Command::Ping => self.cmd_ping(id, ps[0]),
            Command::Pong => Ok(()),
            Command::PrivMsg => self.cmd_privmsg(id, ps[0], ps[1]),
            Command::Quit => self.cmd_quit(id, ps[0]),
            Command::Server => self.cmd_server(id, &msg),
            Command::Time => self.cmd_time(id),
            Command::Topic => self.cmd_topic(id, ps[0], if n == 1 { None } else { Some(ps[1]) }),
            Command::User => self.cmd_user(id, ps[0], ps[3]),
            Command::Version => self.cmd_version(id),
            Command::Wallops => self.cmd_wallops(id, ps[0]),
            Command::Who => self.cmd_who(id, ps[0], ps[1]),
            Command::Whois => self.cmd_whois(id, ps[0]),
            Command::Whowas => self.cmd_whowas(id, ps[0], ps[1]),
            Command::Reply(_) => Ok(()),
        };

        if cmd_result.is_ok() {
            if let Some(client) = self.clients.get_mut(id) {
                let old_state = client.state();
                let new_state = client.apply_command(command);
                if new_state.is_registered() && !old_state.is_registered() {
                    self.register_user(id);
                }
            }
        }
    }

    /// Outcome of the async connection password check.
    pub fn pass_result(&mut self, id: ClientId, ok: bool) -> Vec<Pending> {
        let held = {
            let client = match self.clients.get_mut(id) {
                Some(client) => client,
                None => return Vec::new(),
            };
            client.awaiting_verify = false;
            if ok {
                client.password_accepted = true;
                Some(std::mem::take(&mut client.held_lines))
            } else {
                None
            }
        };

        let held = match held {
            Some(held) => held,
            None => {
                log::debug!("{}: PASS: password mismatch", id);
                self.send_reply(id, rpl::ERR_PASSWDMISMATCH, &[lines::PASSWORD_MISMATCH]);
                self.disconnect(id, lines::PASSWORD_MISMATCH);
                return Vec::new();
            }
        };

        log::debug!("{}: PASS: password accepted", id);
        self.replay_held(id, held)
    }

    /// Outcome of the async OPER credentials check.
    pub fn oper_result(&mut self, id: ClientId, ok: bool) -> Vec<Pending> {
        let held = {
            let client = match self.clients.get_mut(id) {
                Some(client) => client,
                None => return Vec::new(),
            };
            client.awaiting_verify = false;
            if ok {
                client.grant_operator();
            }
            std::mem::take(&mut client.held_lines)
        };

        if ok {
            log::info!("{}: OPER", id);
            let nick = self.clients[id].nick().to_owned();
            let mut response = ResponseBuffer::new();
            response.prefixed_message(&self.domain, Command::Mode)
                .param(&nick)
                .param("+o");
            response.prefixed_message(&self.domain, rpl::YOUREOPER)
                .param(&nick)
                .trailing_param(lines::YOURE_OPER);
            self.send(id, MessageQueueItem::from(response));
        } else {
            log::debug!("{}: OPER: password mismatch", id);
            self.send_reply(id, rpl::ERR_PASSWDMISMATCH, &[lines::PASSWORD_MISMATCH]);
        }

        self.replay_held(id, held)
    }

    /// Replays lines held during a password check, in order.
    fn replay_held(&mut self, id: ClientId, held: Vec<String>) -> Vec<Pending> {
        let mut pending = Vec::new();
        for line in held {
            pending.extend(self.handle_line(id, &line));
            if !self.clients.contains(id) {
                break;
            }
        }
        pending
    }

    /// Drops the clients whose queue broke during the last handler.
    pub fn reap_dead(&mut self) {
        loop {
            let dead = std::mem::take(&mut *self.dead.borrow_mut());
            if dead.is_empty() {
                return;
            }
            for id in dead {
                if self.clients.contains(id) {
                    log::debug!("{}: Dropped: {}", id, lines::BROKEN_PIPE);
                    let client = self.clients.remove(id);
                    self.remove_client(id, client, Some(lines::BROKEN_PIPE.to_owned()));
                }
            }
        }
    }

    pub fn ping_sweep(&mut self) {
        let now = time();
        let mut ping = ResponseBuffer::new();
        ping.message(Command::Ping).trailing_param(&self.domain);
        let ping = MessageQueueItem::from(ping);

        let mut timed_out = Vec::new();
        for (id, client) in self.clients.iter() {
            if !client.is_local() {
                continue;
            }
            if now.saturating_sub(client.last_ping) > self.ping_timeout {
                timed_out.push(id);
            } else {
                self.send(id, ping.clone());
            }
        }
        for id in timed_out {
            log::info!("{}: {}", id, lines::PING_TIMEOUT);
            self.disconnect(id, lines::PING_TIMEOUT);
        }
        self.reap_dead();
    }

    pub fn rehash(&mut self, config: config::State) {
        if config.domain != self.domain {
            log::warn!("Rehash cannot change the server domain, keeping {:?}", self.domain);
        }
        self.network = config.network;
        self.description = config.description;
        self.motd = config.motd;
        self.password = config.password;
        self.opers = config.opers;
        self.links = config.links;
        self.ping_timeout = config.ping_timeout;
        self.whowas_limit = config.whowas_limit;
        self.nicklen = config.nicklen;
        self.history.truncate(self.whowas_limit);
        log::info!("Configuration reloaded");
    }

    /// Sends the ERROR notice and tears the connection down.
    fn disconnect(&mut self, id: ClientId, reason: &str) {
        if !self.clients.contains(id) {
            return;
        }
        let client = self.clients.remove(id);
        let mut response = ResponseBuffer::new();
        response.prefixed_message(&self.domain, "ERROR").trailing_param(lines::CLOSING_LINK);
        let _ = client.send(response);
        self.remove_client(id, client, Some(reason.to_owned()));
    }
}

// Send utilities
impl StateInner {
    /// Sends the given message to the given client.
    ///
    /// A failed send marks the client for deferred teardown instead of aborting the caller.
    fn send(&self, id: ClientId, msg: MessageQueueItem) {
        if let Some(client) = self.clients.get(id) {
            if client.send(msg).is_err() {
                self.dead.borrow_mut().push(id);
            }
        }
    }

    /// Sends the given message to all members of the given channel.
    fn broadcast(&self, target: &str, msg: MessageQueueItem) {
        if let Some(channel) = self.channels.get(u(target)) {
            for member in channel.members.keys() {
                self.send(*member, msg.clone());
            }
        }
    }

    /// Creates a message from the given reply and parameters, and sends it to the given
    /// client.  It also adds the needed client's nick as the first parameter.
    fn send_reply(&self, id: ClientId, r: Reply, params: &[&str]) {
        let client = match self.clients.get(id) {
            Some(client) => client,
            None => return,
        };
        let mut response = ResponseBuffer::new();
        {
            let mut msg = response.prefixed_message(&self.domain, r).param(client.nick());
            if !params.is_empty() {
                for p in &params[0..params.len() - 1] {
                    msg = msg.param(p);
                }
                msg.trailing_param(params[params.len() - 1]);
            }
        }
        self.send(id, MessageQueueItem::from(response));
    }

    /// Sends the list of nicknames in the channel `channel_name` to the given client.
    fn send_names(&self, id: ClientId, channel_name: &str) {
        if let Some(channel) = self.channels.get(u(channel_name)) {
            if !channel.is_public() && !channel.members.contains_key(&id) {
                return;
            }
            let client = &self.clients[id];
            let mut response = ResponseBuffer::new();
            if !channel.members.is_empty() {
                let mut message = response.prefixed_message(&self.domain, rpl::NAMREPLY)
                    .param(client.nick())
                    .param(channel.symbol())
                    .param(channel_name);
                let trailing = message.raw_trailing_param();
                for (member, member_modes) in &channel.members {
                    if let Some(s) = member_modes.symbol() {
                        trailing.push(s);
                    }
                    trailing.push_str(self.clients[*member].nick());
                    trailing.push(' ');
                }
                trailing.pop();  // Remove last space
            }
            response.prefixed_message(&self.domain, rpl::ENDOFNAMES)
                .param(client.nick())
                .param(channel_name)
                .trailing_param(lines::END_OF_NAMES);
            self.send(id, MessageQueueItem::from(response));
        }
    }

    /// Sends the topic of the channel `channel_name` to the given client.
    fn send_topic(&self, id: ClientId, channel_name: &str) {
        let channel = &self.channels[u(channel_name)];
        if let Some(ref topic) = channel.topic {
            self.send_reply(id, rpl::TOPIC, &[channel_name, topic]);
        } else {
            self.send_reply(id, rpl::NOTOPIC, &[channel_name, lines::NO_TOPIC]);
        }
    }

    /// Sends welcome messages and introduces the new user to the link peers.  Called when a
    /// client has completed its registration.
    fn register_user(&mut self, id: ClientId) {
        {
            // Wallops are on by default.
            let client = &mut self.clients[id];
            client.apply_mode_change(modes::UserModeChange::Wallops(true));
        }
        let client = &self.clients[id];
        log::info!("{}: Registered as {}", id, client.full_name());

        let mut response = ResponseBuffer::new();
        lines::welcome(response.prefixed_message(&self.domain, rpl::WELCOME).param(client.nick()),
                       &self.network, &client.full_name());
        lines::your_host(response.prefixed_message(&self.domain, rpl::YOURHOST).param(client.nick()),
                         &self.domain, SERVER_VERSION);
        lines::created(response.prefixed_message(&self.domain, rpl::CREATED).param(client.nick()),
                       &self.created_at);
        response.prefixed_message(&self.domain, rpl::MYINFO)
            .param(client.nick())
            .param(&self.domain)
            .param(SERVER_VERSION)
            .param(modes::USER_MODES)
            .param(modes::SIMPLE_CHAN_MODES)
            .param(modes::EXTENDED_CHAN_MODES);
        self.send(id, MessageQueueItem::from(response));
        let _ = self.cmd_motd(id);

        self.introduce_user(id);
    }

    fn find_channel(&self, id: ClientId, name: &str) -> Result<&Channel, ()> {
        match self.channels.get(u(name)) {
            Some(channel) => Ok(channel),
            None => {
                log::debug!("{}:         no such channel", id);
                self.send_reply(id, rpl::ERR_NOSUCHCHANNEL, &[name, lines::NO_SUCH_CHANNEL]);
                Err(())
            }
        }
    }

    fn find_nick(&self, id: ClientId, nick: &str) -> Result<(ClientId, &Client), ()> {
        let found = self.clients.iter()
            .find(|(_, client)| client.is_registered() && !client.state().is_server_link()
                && u(client.nick()) == u(nick));
        match found {
            Some(found) => Ok(found),
            None => {
                log::debug!("{}:         nick doesn't exist", id);
                self.send_reply(id, rpl::ERR_NOSUCHNICK, &[nick, lines::NO_SUCH_NICK]);
                Err(())
            }
        }
    }

    fn share_channel(&self, a: ClientId, b: ClientId) -> bool {
        self.channels.values()
            .any(|channel| channel.members.contains_key(&a) && channel.members.contains_key(&b))
    }
}
