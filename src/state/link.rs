//! The server-to-server link protocol.
//!
//! Links exchange three kinds of messages: `PASS <password> <version> <flags>` and
//! `SERVER <name> <hopcount> <token> <info>` for the handshake, and `NICK <nick> <hopcount>
//! <user> <host> <token> <modes> :<realname>` to introduce users.  After the burst, PRIVMSG
//! and NOTICE are relayed by nick, and QUIT withdraws remote users.

use super::{ClientId, HandlerResult, Pending, StateInner, LOCAL_TOKEN, SERVER_VERSION};
use super::{is_valid_channel_name, is_valid_nickname};
use crate::client::{Client, MessageQueue, MessageQueueItem};
use crate::config;
use crate::lines;
use crate::message::{Command, Message, ResponseBuffer};
use crate::modes;
use kaede_unicase::{u, UniCase};
use std::collections::HashSet;

/// A server known to this one, directly linked or learned from a peer.
pub struct RemoteServer {
    pub name: String,
    pub description: String,

    /// Token the `via` peer uses for this server in NICK bursts.
    pub token: u32,

    /// Number of hops to this server.  1 for direct peers.
    pub hop_count: u32,

    /// The local connection this server is reached through.
    pub via: ClientId,

    /// Set once the link password has been checked.  Transitive servers are trusted from
    /// their introducer and start authenticated.
    pub authenticated: bool,
}

impl StateInner {
    /// SERVER from a connection that has not spoken the link protocol yet.
    pub fn cmd_server(&mut self, id: ClientId, msg: &Message<'_>) -> HandlerResult {
        let ps = msg.params;
        log::debug!("{}: SERVER {:?} {:?} {:?} {:?}", id, ps[0], ps[1], ps[2], ps[3]);
        self.link_introduction(id, ps[0], ps[1], ps[2], ps[3])
    }

    /// Dispatch for messages received on an established server link.
    pub fn handle_server_message(&mut self, id: ClientId, command: Command, msg: &Message<'_>) {
        let ps = msg.params;
        match command {
            Command::Pass => self.link_pass(id, ps[0]),
            Command::Server => self.link_server(id, msg),
            Command::Nick => self.link_nick(id, msg),
            Command::PrivMsg | Command::Notice => self.link_relay(id, command, msg),
            Command::Ping => {
                let _ = self.cmd_ping(id, ps[0]);
            }
            Command::Pong => {}
            Command::Quit => self.link_quit(id, msg),
            _ => {
                log::debug!("{}: {:?}: ignored on server link", id, command);
            }
        }
    }

    /// Registers an outbound link connection and sends this server's introduction.
    pub fn outbound_link(&mut self, queue: MessageQueue, link: config::Link) -> ClientId {
        let mut client = Client::new(queue, link.host.clone(), self.domain.clone());
        client.on_link_port = true;
        client.initiated_link = true;
        client.server = link.name.clone();
        client.apply_command(Command::Server);
        let id = self.clients.insert(client);
        log::info!("{}: Connecting to {}", id, link.name);

        let mut intro = ResponseBuffer::new();
        intro.message(Command::Pass)
            .param(&link.password)
            .param("0210")
            .param(SERVER_VERSION);
        intro.message(Command::Server)
            .param(&self.domain)
            .param("1")
            .param(&LOCAL_TOKEN.to_string())
            .trailing_param(&self.description);
        self.send(id, MessageQueueItem::from(intro));
        id
    }

    /// A direct peer names itself.  Its PASS is checked against the link's password hash;
    /// `link_pass_result` finishes the handshake.
    fn link_introduction(&mut self, id: ClientId, name: &str, hop: &str, token: &str,
                         info: &str) -> HandlerResult {
        let hop_count: u32 = match hop.parse() {
            Ok(hop_count) => hop_count,
            Err(_) => {
                self.disconnect(id, lines::CLOSING_LINK);
                return Err(());
            }
        };
        let token: u32 = token.parse().unwrap_or(1);

        if u(name) == u(self.domain.as_str()) || self.servers.contains_key(u(name)) {
            log::warn!("{}: SERVER {}: duplicate introduction", id, name);
            self.disconnect(id, lines::CLOSING_LINK);
            return Err(());
        }
        let hash = match self.links.iter().find(|link| u(link.name.as_str()) == u(name)) {
            Some(link) => link.password_hash.clone(),
            None => {
                log::warn!("{}: SERVER {}: no such link configured", id, name);
                self.disconnect(id, lines::CLOSING_LINK);
                return Err(());
            }
        };
        let given = match self.clients[id].given_password.take() {
            Some(given) => given,
            None => {
                log::warn!("{}: SERVER {}: no password given", id, name);
                self.disconnect(id, lines::PASSWORD_MISMATCH);
                return Err(());
            }
        };

        let client = &mut self.clients[id];
        client.awaiting_verify = true;
        client.server = name.to_owned();
        self.servers.insert(UniCase(name.to_owned()), RemoteServer {
            name: name.to_owned(),
            description: info.to_owned(),
            token,
            hop_count,
            via: id,
            authenticated: false,
        });
        self.pending.push(Pending::LinkPass { id, hash, given });
        Ok(())
    }

    /// Outcome of the async link password check.
    pub fn link_pass_result(&mut self, id: ClientId, ok: bool) -> Vec<Pending> {
        if !self.clients.contains(id) {
            return Vec::new();
        }
        if !ok {
            log::warn!("{}: link password mismatch", id);
            self.clients[id].awaiting_verify = false;
            self.disconnect(id, lines::PASSWORD_MISMATCH);
            return Vec::new();
        }

        let (held, initiated, peer_name) = {
            let client = &mut self.clients[id];
            client.awaiting_verify = false;
            client.password_accepted = true;
            (std::mem::take(&mut client.held_lines), client.initiated_link,
             client.server.clone())
        };
        if let Some(server) = self.servers.get_mut(u(peer_name.as_str())) {
            server.authenticated = true;
        }
        log::info!("{}: Linked with {}", id, peer_name);

        if !initiated {
            let password = self.links.iter()
                .find(|link| u(link.name.as_str()) == u(peer_name.as_str()))
                .map(|link| link.password.clone())
                .unwrap_or_default();
            let mut intro = ResponseBuffer::new();
            intro.message(Command::Pass)
                .param(&password)
                .param("0210")
                .param(SERVER_VERSION);
            intro.message(Command::Server)
                .param(&self.domain)
                .param("1")
                .param(&LOCAL_TOKEN.to_string())
                .trailing_param(&self.description);
            self.send(id, MessageQueueItem::from(intro));
        }
        self.send_burst(id);
        self.replay_held(id, held)
    }

    /// Sends everything the new peer needs to know: the servers this one can reach, then all
    /// known users.
    fn send_burst(&self, id: ClientId) {
        let mut burst = ResponseBuffer::new();
        for server in self.servers.values() {
            if server.via == id {
                continue;
            }
            burst.prefixed_message(&self.domain, Command::Server)
                .param(&server.name)
                .param(&(server.hop_count + 1).to_string())
                .param(&server.token.to_string())
                .trailing_param(&server.description);
        }
        for (other, client) in self.clients.iter() {
            if other == id || !client.is_registered() {
                continue;
            }
            let token = if client.is_local() {
                LOCAL_TOKEN
            } else {
                match self.servers.get(u(client.server.as_str())) {
                    // Users learned from the new peer itself are not echoed back.
                    Some(server) if server.via == id => continue,
                    Some(server) => server.token,
                    None => continue,
                }
            };
            burst.message(Command::Nick)
                .param(client.nick())
                .param(&(client.hop_count + 1).to_string())
                .param(client.user())
                .param(client.host())
                .param(&token.to_string())
                .param(&client.modes())
                .trailing_param(client.real());
        }
        if !burst.is_empty() {
            self.send(id, MessageQueueItem::from(burst));
        }
    }

    /// Announces a newly registered local user to all link peers.
    pub(super) fn introduce_user(&self, id: ClientId) {
        let client = &self.clients[id];
        let mut burst = ResponseBuffer::new();
        burst.message(Command::Nick)
            .param(client.nick())
            .param("1")
            .param(client.user())
            .param(client.host())
            .param(&LOCAL_TOKEN.to_string())
            .param(&client.modes())
            .trailing_param(client.real());
        self.relay_to_links(None, MessageQueueItem::from(burst));
    }

    fn link_pass(&mut self, id: ClientId, password: &str) {
        log::debug!("{}: PASS (link)", id);
        self.clients[id].given_password = Some(password.to_owned());
    }

    /// SERVER on an established link: either the peer's own introduction (outbound
    /// connections), or a transitive announcement.
    fn link_server(&mut self, id: ClientId, msg: &Message<'_>) {
        let ps = msg.params;
        if msg.num_params < 4 {
            return;
        }
        let direct_peer_known = self.servers.values().any(|s| s.via == id && s.hop_count == 1);
        if msg.prefix.is_none() && !direct_peer_known {
            let _ = self.link_introduction(id, ps[0], ps[1], ps[2], ps[3]);
            return;
        }

        let name = ps[0];
        let hop_count: u32 = match ps[1].parse() {
            Ok(hop_count) => hop_count,
            Err(_) => return,
        };
        let token: u32 = ps[2].parse().unwrap_or(1);
        let info = ps[3];

        if u(name) == u(self.domain.as_str()) || self.servers.contains_key(u(name)) {
            // Already known: the announcement is neither recorded nor rebroadcast, which
            // stops flood loops in cyclic topologies.
            log::debug!("{}: SERVER {}: already known, dropped", id, name);
            return;
        }
        log::info!("{}: Learned about server {} ({} hops)", id, name, hop_count);
        self.servers.insert(UniCase(name.to_owned()), RemoteServer {
            name: name.to_owned(),
            description: info.to_owned(),
            token,
            hop_count,
            via: id,
            authenticated: true,
        });

        let mut relay = ResponseBuffer::new();
        relay.prefixed_message(&self.domain, Command::Server)
            .param(name)
            .param(&(hop_count + 1).to_string())
            .param(ps[2])
            .trailing_param(info);
        self.relay_to_links(Some(id), MessageQueueItem::from(relay));
    }

    /// NICK on a link: a seven-parameter user introduction, or a prefixed nick change.
    fn link_nick(&mut self, id: ClientId, msg: &Message<'_>) {
        let ps = msg.params;
        if msg.num_params >= 7 {
            let nick = ps[0];
            let hop_count: u32 = match ps[1].parse() {
                Ok(hop_count) => hop_count,
                Err(_) => return,
            };
            let token: u32 = ps[4].parse().unwrap_or(1);
            if !is_valid_nickname(nick, self.nicklen) {
                log::warn!("{}: NICK {:?}: invalid remote nickname, dropped", id, nick);
                return;
            }
            let in_use = self.clients.iter().any(|(_, client)| u(client.nick()) == u(nick));
            if in_use {
                log::warn!("{}: NICK {:?}: collision, dropped", id, nick);
                return;
            }
            let server = self.servers.values()
                .find(|server| server.via == id && server.token == token)
                .map_or_else(|| self.clients[id].server.clone(), |server| server.name.clone());
            log::info!("{}: Remote user {} on {}", id, nick, server);

            let mut client = Client::new_remote(nick, ps[2], ps[6], ps[3], server, hop_count);
            for mode in ps[5].chars() {
                match mode {
                    'i' => {
                        client.apply_mode_change(modes::UserModeChange::Invisible(true));
                    }
                    'w' => {
                        client.apply_mode_change(modes::UserModeChange::Wallops(true));
                    }
                    'o' => client.grant_operator(),
                    _ => {}
                }
            }
            self.clients.insert(client);

            let mut relay = ResponseBuffer::new();
            relay.message(Command::Nick)
                .param(nick)
                .param(&(hop_count + 1).to_string())
                .param(ps[2])
                .param(ps[3])
                .param(ps[4])
                .param(ps[5])
                .trailing_param(ps[6]);
            self.relay_to_links(Some(id), MessageQueueItem::from(relay));
        } else if let Some(old_nick) = msg.prefix {
            if msg.num_params < 1 {
                return;
            }
            let new_nick = ps[0];
            if !is_valid_nickname(new_nick, self.nicklen) {
                return;
            }
            let in_use = self.clients.iter()
                .any(|(_, client)| u(client.nick()) == u(new_nick));
            if in_use {
                log::warn!("{}: NICK {:?}: collision, dropped", id, new_nick);
                return;
            }
            let found = self.clients.iter()
                .find(|(_, client)| !client.is_local() && u(client.nick()) == u(old_nick))
                .map(|(remote_id, _)| remote_id);
            let remote_id = match found {
                Some(remote_id) => remote_id,
                None => return,
            };
            self.clients[remote_id].set_nick(new_nick);

            let mut response = ResponseBuffer::new();
            response.prefixed_message(old_nick, Command::Nick).param(new_nick);
            let msg_item = MessageQueueItem::from(response);
            let mut receivers: HashSet<ClientId> = HashSet::new();
            for channel in self.channels.values() {
                if channel.members.contains_key(&remote_id) {
                    receivers.extend(channel.members.keys());
                }
            }
            for receiver in receivers {
                self.send(receiver, msg_item.clone());
            }
            self.relay_to_links(Some(id), msg_item);
        }
    }

    /// PRIVMSG and NOTICE from a link, identified by their nick prefix.
    fn link_relay(&mut self, id: ClientId, cmd: Command, msg: &Message<'_>) {
        let sender_nick = match msg.prefix {
            Some(prefix) => prefix,
            None => return,
        };
        if msg.num_params < 2 || msg.params[1].is_empty() {
            return;
        }
        let target = msg.params[0];
        let content = msg.params[1];
        let found = self.clients.iter()
            .find(|(_, client)| client.is_registered() && u(client.nick()) == u(sender_nick));
        let (sender_id, sender) = match found {
            Some(found) => found,
            None => {
                log::debug!("{}: {} from unknown user {:?}, dropped", id, cmd.as_str(),
                            sender_nick);
                return;
            }
        };
        let full_name = sender.full_name();

        if is_valid_channel_name(target) {
            let can_talk = self.channels.get(u(target))
                .map_or(false, |channel| channel.can_talk(sender_id));
            if !can_talk {
                return;
            }
            let mut response = ResponseBuffer::new();
            response.prefixed_message(&full_name, cmd).param(target).trailing_param(content);
            let msg_item = MessageQueueItem::from(response);
            let channel = &self.channels[u(target)];
            for member in channel.members.keys().filter(|member| **member != sender_id) {
                self.send(*member, msg_item.clone());
            }
        } else {
            let found = self.clients.iter()
                .find(|(_, client)| client.is_registered() && u(client.nick()) == u(target));
            let (target_id, target_client) = match found {
                Some(found) => found,
                None => return,
            };
            if target_client.is_local() {
                let mut response = ResponseBuffer::new();
                response.prefixed_message(&full_name, cmd).param(target).trailing_param(content);
                self.send(target_id, MessageQueueItem::from(response));
            } else if let Some(via) = self.route(&target_client.server) {
                if via != id {
                    let mut relay = ResponseBuffer::new();
                    relay.prefixed_message(sender_nick, cmd).param(target).trailing_param(content);
                    self.send(via, MessageQueueItem::from(relay));
                }
            }
        }
    }

    /// QUIT from a link withdraws the prefixed remote user.
    fn link_quit(&mut self, id: ClientId, msg: &Message<'_>) {
        let nick = match msg.prefix {
            Some(prefix) => prefix,
            None => {
                self.peer_quit(id, None);
                return;
            }
        };
        let found = self.clients.iter()
            .find(|(_, client)| !client.is_local() && u(client.nick()) == u(nick))
            .map(|(remote_id, _)| remote_id);
        let remote_id = match found {
            Some(remote_id) => remote_id,
            None => return,
        };
        let reason = if msg.num_params > 0 { Some(msg.params[0].to_owned()) } else { None };
        let client = self.clients.remove(remote_id);
        self.remove_client(remote_id, client, reason.clone());

        let mut relay = ResponseBuffer::new();
        {
            let quit = relay.prefixed_message(nick, Command::Quit);
            if let Some(ref reason) = reason {
                quit.trailing_param(reason);
            }
        }
        self.relay_to_links(Some(id), MessageQueueItem::from(relay));
    }

    /// Sends a message to every direct link peer, except `exclude`.
    pub(super) fn relay_to_links(&self, exclude: Option<ClientId>, msg: MessageQueueItem) {
        let mut sent: HashSet<ClientId> = HashSet::new();
        for server in self.servers.values() {
            if !server.authenticated || server.hop_count != 1 {
                continue;
            }
            if Some(server.via) == exclude {
                continue;
            }
            if sent.insert(server.via) {
                self.send(server.via, msg.clone());
            }
        }
    }

    /// The connection a message for `server_name` goes through.
    pub(super) fn route(&self, server_name: &str) -> Option<ClientId> {
        self.servers.get(u(server_name)).map(|server| server.via)
    }

    /// Tears down everything that was reachable through a lost link connection.
    pub(super) fn unlink_server(&mut self, id: ClientId, client: &Client,
                                reason: Option<&str>) {
        let gone: Vec<String> = self.servers.values()
            .filter(|server| server.via == id)
            .map(|server| server.name.clone())
            .collect();
        if gone.is_empty() {
            return;
        }
        for name in &gone {
            self.servers.remove(u(name.as_str()));
            log::info!("Unlinked from {}", name);
        }

        let netsplit = reason.map_or_else(
            || format!("{} {}", self.domain, client.server),
            str::to_owned,
        );
        let split_users: Vec<ClientId> = self.clients.iter()
            .filter(|(_, client)| !client.is_local()
                && gone.iter().any(|name| u(name.as_str()) == u(client.server.as_str())))
            .map(|(remote_id, _)| remote_id)
            .collect();
        for remote_id in split_users {
            let client = self.clients.remove(remote_id);
            let nick = client.nick().to_owned();
            self.remove_client(remote_id, client, Some(netsplit.clone()));

            let mut relay = ResponseBuffer::new();
            relay.prefixed_message(&nick, Command::Quit).trailing_param(&netsplit);
            self.relay_to_links(Some(id), MessageQueueItem::from(relay));
        }
    }
}
