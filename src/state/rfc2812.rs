//! Handlers for client commands.
//!
//! <https://tools.ietf.org/html/rfc2812.html>

use super::{ClientId, HandlerResult, Pending, StateInner, SERVER_VERSION};
use super::{is_valid_channel_name, is_valid_nickname};
use crate::channel::Channel;
use crate::client::{Client, MessageQueueItem};
use crate::lines;
use crate::message::{Command, ResponseBuffer, rpl};
use crate::modes;
use crate::util::{mask_match, time, time_str};
use kaede_unicase::{u, UniCase};
use std::collections::HashSet;

impl StateInner {
    pub fn cmd_away(&mut self, id: ClientId, reason: &str) -> HandlerResult {
        log::debug!("{}: AWAY {:?}", id, reason);
        let client = &mut self.clients[id];
        if reason.is_empty() {
            client.away_message = None;
            self.send_reply(id, rpl::UNAWAY, &[lines::UN_AWAY]);
        } else {
            client.away_message = Some(reason.to_owned());
            self.send_reply(id, rpl::NOWAWAY, &[lines::NOW_AWAY]);
        }
        Ok(())
    }

    pub fn cmd_connect(&mut self, id: ClientId, target: &str, port: &str) -> HandlerResult {
        log::debug!("{}: CONNECT {:?} {:?}", id, target, port);
        if !self.clients[id].is_operator() {
            self.send_reply(id, rpl::ERR_NOPRIVILEGES, &[lines::NO_PRIVILEGES]);
            return Err(());
        }
        let link = self.links.iter().find(|link| u(link.name.as_str()) == u(target));
        let mut link = match link {
            Some(link) => link.clone(),
            None => {
                self.send_reply(id, rpl::ERR_NOSUCHSERVER, &[target, lines::NO_SUCH_SERVER]);
                return Err(());
            }
        };
        if self.servers.contains_key(u(link.name.as_str())) {
            log::debug!("{}:         already linked with {}", id, link.name);
            return Ok(());
        }
        if let Ok(port) = port.parse() {
            link.port = port;
        }
        self.pending.push(Pending::Connect { link });
        Ok(())
    }

    pub fn cmd_invite(&mut self, id: ClientId, target_nick: &str,
                      channel_name: &str) -> HandlerResult {
        log::debug!("{}: INVITE {:?} {:?}", id, target_nick, channel_name);
        let (target_id, _) = self.find_nick(id, target_nick)?;

        if let Some(channel) = self.channels.get(u(channel_name)) {
            match channel.members.get(&id) {
                Some(member) => if channel.invite_only && !member.operator {
                    self.send_reply(id, rpl::ERR_CHANOPRIVSNEEDED,
                                    &[channel_name, lines::CHAN_O_PRIVS_NEEDED]);
                    return Err(());
                },
                None => {
                    self.send_reply(id, rpl::ERR_NOTONCHANNEL,
                                    &[channel_name, lines::NOT_ON_CHANNEL]);
                    return Err(());
                }
            }
            if channel.members.contains_key(&target_id) {
                self.send_reply(id, rpl::ERR_USERONCHANNEL,
                                &[target_nick, channel_name, lines::USER_ON_CHANNEL]);
                return Err(());
            }
        }

        if let Some(channel) = self.channels.get_mut(u(channel_name)) {
            channel.invite(target_nick);
        }

        self.send_reply(id, rpl::INVITING, &[channel_name, target_nick]);
        let mut invite = ResponseBuffer::new();
        invite.prefixed_message(&self.clients[id].full_name(), Command::Invite)
            .param(target_nick)
            .param(channel_name);
        self.send(target_id, MessageQueueItem::from(invite));
        Ok(())
    }

    pub fn cmd_join(&mut self, id: ClientId, targets: &str, keys: &str) -> HandlerResult {
        log::debug!("{}: JOIN {:?} {:?}", id, targets, keys);
        let mut keys = keys.split(',');
        for target in targets.split(',').filter(|target| !target.is_empty()) {
            let key = keys.next().unwrap_or("");
            let _ = self.join_one(id, target, key);
        }
        Ok(())
    }

    fn join_one(&mut self, id: ClientId, target: &str, key: &str) -> HandlerResult {
        if !is_valid_channel_name(target) {
            log::debug!("{}:         invalid channel name {:?}", id, target);
            self.send_reply(id, rpl::ERR_NOSUCHCHANNEL, &[target, lines::NO_SUCH_CHANNEL]);
            return Err(());
        }

        let nick = self.clients[id].nick().to_owned();
        let full_name = self.clients[id].full_name();
        if let Some(channel) = self.channels.get(u(target)) {
            if channel.members.contains_key(&id) {
                return Err(());
            }
            // Checked in this order: invite, ban, limit, key.
            if channel.invite_only && !channel.is_invited(&nick) {
                self.send_reply(id, rpl::ERR_INVITEONLYCHAN, &[target, lines::INVITE_ONLY_CHAN]);
                return Err(());
            }
            if channel.is_banned(&full_name) {
                self.send_reply(id, rpl::ERR_BANNEDFROMCHAN, &[target, lines::BANNED_FROM_CHAN]);
                return Err(());
            }
            if let Some(limit) = channel.user_limit {
                if limit <= channel.members.len() {
                    self.send_reply(id, rpl::ERR_CHANNELISFULL, &[target, lines::CHANNEL_IS_FULL]);
                    return Err(());
                }
            }
            if let Some(ref channel_key) = channel.key {
                if channel_key != key {
                    self.send_reply(id, rpl::ERR_BADCHANKEY, &[target, lines::BAD_CHAN_KEY]);
                    return Err(());
                }
            }
        }

        let channel = self.channels.entry(UniCase(target.to_owned()))
            .or_insert_with(|| Channel::new(target));
        channel.add_member(id);
        channel.remove_invite(&nick);
        let channel_name = channel.name.clone();

        let client = &mut self.clients[id];
        client.channels.push(channel_name.clone());
        client.last_action_time = time();

        let mut join = ResponseBuffer::new();
        join.prefixed_message(&full_name, Command::Join).param(&channel_name);
        self.broadcast(&channel_name, MessageQueueItem::from(join));
        self.send_topic(id, &channel_name);
        self.send_names(id, &channel_name);
        Ok(())
    }

    pub fn cmd_kick(&mut self, id: ClientId, channel_name: &str, target_nick: &str,
                    reason: &str) -> HandlerResult {
        log::debug!("{}: KICK {:?} {:?} {:?}", id, channel_name, target_nick, reason);
        let (target_id, _) = self.find_nick(id, target_nick)?;

        {
            let channel = self.find_channel(id, channel_name)?;
            match channel.members.get(&id) {
                Some(member) => if !member.can_moderate() {
                    self.send_reply(id, rpl::ERR_CHANOPRIVSNEEDED,
                                    &[channel_name, lines::CHAN_O_PRIVS_NEEDED]);
                    return Err(());
                },
                None => {
                    self.send_reply(id, rpl::ERR_NOTONCHANNEL,
                                    &[channel_name, lines::NOT_ON_CHANNEL]);
                    return Err(());
                }
            }
            if !channel.members.contains_key(&target_id) {
                self.send_reply(id, rpl::ERR_USERNOTINCHANNEL,
                                &[target_nick, channel_name, lines::USER_NOT_IN_CHANNEL]);
                return Err(());
            }
        }

        let mut kick = ResponseBuffer::new();
        {
            let msg = kick.prefixed_message(&self.clients[id].full_name(), Command::Kick)
                .param(channel_name)
                .param(target_nick);
            if !reason.is_empty() {
                msg.trailing_param(reason);
            }
        }
        self.broadcast(channel_name, MessageQueueItem::from(kick));

        let channel = self.channels.get_mut(u(channel_name)).unwrap();
        channel.remove_member(target_id);
        if channel.members.is_empty() {
            self.channels.remove(u(channel_name));
        }
        self.clients[target_id].channels.retain(|name| u(name.as_str()) != u(channel_name));
        Ok(())
    }

    pub fn cmd_list(&self, id: ClientId, targets: &str) -> HandlerResult {
        log::debug!("{}: LIST {:?}", id, targets);
        let nick = self.clients[id].nick();
        let mut response = ResponseBuffer::new();
        if targets.is_empty() {
            for channel in self.channels.values() {
                if !channel.is_public() && !channel.members.contains_key(&id) {
                    continue;
                }
                channel.list_entry(response.prefixed_message(&self.domain, rpl::LIST)
                    .param(nick)
                    .param(&channel.name));
            }
        } else {
            for name in targets.split(',').filter(|name| !name.is_empty()) {
                if let Some(channel) = self.channels.get(u(name)) {
                    if !channel.is_public() && !channel.members.contains_key(&id) {
                        continue;
                    }
                    channel.list_entry(response.prefixed_message(&self.domain, rpl::LIST)
                        .param(nick)
                        .param(&channel.name));
                }
            }
        }
        response.prefixed_message(&self.domain, rpl::LISTEND)
            .param(nick)
            .trailing_param(lines::END_OF_LIST);
        self.send(id, MessageQueueItem::from(response));
        Ok(())
    }

    pub fn cmd_mode(&mut self, id: ClientId, target: &str, modes: &str,
                    params: &[&str]) -> HandlerResult {
        log::debug!("{}: MODE {:?} {:?} {:?}", id, target, modes, params);
        if is_valid_channel_name(target) {
            if modes.is_empty() {
                self.cmd_mode_chan_get(id, target)
            } else {
                self.cmd_mode_chan_set(id, target, modes, params)
            }
        } else if modes.is_empty() {
            self.cmd_mode_user_get(id, target)
        } else {
            self.cmd_mode_user_set(id, target, modes)
        }
    }

    fn cmd_mode_chan_get(&self, id: ClientId, target: &str) -> HandlerResult {
        let channel = self.find_channel(id, target)?;
        let full_info = channel.members.contains_key(&id);
        let mut response = ResponseBuffer::new();
        channel.write_modes(response.prefixed_message(&self.domain, rpl::CHANNELMODEIS)
            .param(self.clients[id].nick())
            .param(target), full_info);
        self.send(id, MessageQueueItem::from(response));
        Ok(())
    }

    fn cmd_mode_chan_set(&mut self, id: ClientId, target: &str, modes: &str,
                         params: &[&str]) -> HandlerResult {
        let nick = self.clients[id].nick().to_owned();
        let (actor_op, actor_can_moderate) = {
            let channel = match self.channels.get(u(target)) {
                Some(channel) => channel,
                None => {
                    self.send_reply(id, rpl::ERR_NOSUCHCHANNEL,
                                    &[target, lines::NO_SUCH_CHANNEL]);
                    return Err(());
                }
            };
            match channel.members.get(&id) {
                Some(member) => (member.operator, member.can_moderate()),
                None => {
                    self.send_reply(id, rpl::ERR_NOTONCHANNEL, &[target, lines::NOT_ON_CHANNEL]);
                    return Err(());
                }
            }
        };

        let mut response = ResponseBuffer::new();
        let mut applied_modes = String::new();
        let mut applied_params = Vec::new();
        {
            let clients = &self.clients;
            let domain = &self.domain;
            let channel = self.channels.get_mut(u(target)).unwrap();
            for change in modes::channel_query(modes, params) {
                match change {
                    Ok(modes::ChannelModeChange::GetBans) => {
                        for ban in &channel.bans {
                            response.prefixed_message(domain, rpl::BANLIST)
                                .param(&nick)
                                .param(target)
                                .param(&ban.mask)
                                .param(&ban.setter)
                                .param(&ban.at.to_string());
                        }
                        response.prefixed_message(domain, rpl::ENDOFBANLIST)
                            .param(&nick)
                            .param(target)
                            .trailing_param(lines::END_OF_BAN_LIST);
                    }
                    Ok(change) => {
                        // Voice can be given by half-ops, everything else needs a full op.
                        let allowed = match change {
                            modes::ChannelModeChange::ChangeVoice(_, _) => actor_can_moderate,
                            _ => actor_op,
                        };
                        if !allowed {
                            response.prefixed_message(domain, rpl::ERR_CHANOPRIVSNEEDED)
                                .param(&nick)
                                .param(target)
                                .trailing_param(lines::CHAN_O_PRIVS_NEEDED);
                            continue;
                        }
                        match channel.apply_mode_change(change, &nick, |m| clients[*m].nick()) {
                            Ok(true) => {
                                applied_modes.push(if change.value() { '+' } else { '-' });
                                applied_modes.push(change.symbol());
                                if let Some(param) = change.param() {
                                    applied_params.push(param.to_owned());
                                }
                            }
                            Ok(false) => {}
                            Err(rpl::ERR_KEYSET) => {
                                response.prefixed_message(domain, rpl::ERR_KEYSET)
                                    .param(&nick)
                                    .param(target)
                                    .trailing_param(lines::KEY_SET);
                            }
                            Err(rpl::ERR_BADCHANKEY) => {
                                response.prefixed_message(domain, rpl::ERR_BADCHANKEY)
                                    .param(&nick)
                                    .param(target)
                                    .trailing_param(lines::BAD_KEY);
                            }
                            Err(rpl::ERR_USERNOTINCHANNEL) => {
                                response.prefixed_message(domain, rpl::ERR_USERNOTINCHANNEL)
                                    .param(&nick)
                                    .param(change.param().unwrap_or("*"))
                                    .param(target)
                                    .trailing_param(lines::USER_NOT_IN_CHANNEL);
                            }
                            Err(_) => {}
                        }
                    }
                    Err(modes::Error::UnknownMode(mode)) => {
                        response.prefixed_message(domain, rpl::ERR_UNKNOWNMODE)
                            .param(&nick)
                            .param(&mode.to_string())
                            .trailing_param(lines::UNKNOWN_MODE);
                    }
                    Err(_) => {}
                }
            }
        }
        if !response.is_empty() {
            self.send(id, MessageQueueItem::from(response));
        }
        if !applied_modes.is_empty() {
            let mut broadcast = ResponseBuffer::new();
            {
                let mut msg = broadcast
                    .prefixed_message(&self.clients[id].full_name(), Command::Mode)
                    .param(target)
                    .param(&applied_modes);
                for param in &applied_params {
                    msg = msg.param(param);
                }
            }
            self.broadcast(target, MessageQueueItem::from(broadcast));
        }
        Ok(())
    }

    fn cmd_mode_user_get(&self, id: ClientId, target: &str) -> HandlerResult {
        let (target_id, _) = self.find_nick(id, target)?;
        if target_id != id && !self.clients[id].is_operator() {
            self.send_reply(id, rpl::ERR_USERSDONTMATCH, &[lines::USERS_DONT_MATCH]);
            return Err(());
        }
        self.send_reply(id, rpl::UMODEIS, &[&self.clients[target_id].modes()]);
        Ok(())
    }

    fn cmd_mode_user_set(&mut self, id: ClientId, target: &str, modes: &str) -> HandlerResult {
        let (target_id, _) = self.find_nick(id, target)?;
        if target_id != id && !self.clients[id].is_operator() {
            self.send_reply(id, rpl::ERR_USERSDONTMATCH, &[lines::USERS_DONT_MATCH]);
            return Err(());
        }

        let mut applied = String::new();
        let mut unknown_seen = false;
        {
            let client = &mut self.clients[target_id];
            for change in modes::user_query(modes) {
                match change {
                    Ok(change) => if client.apply_mode_change(change) {
                        applied.push(if change.value() { '+' } else { '-' });
                        applied.push(change.symbol());
                    },
                    Err(modes::Error::UnknownMode(_)) => {
                        unknown_seen = true;
                    }
                    Err(_) => {}
                }
            }
        }
        if unknown_seen {
            self.send_reply(id, rpl::ERR_UMODEUNKNOWNFLAG, &[lines::UNKNOWN_MODE_FLAG]);
        }
        if !applied.is_empty() {
            let mut response = ResponseBuffer::new();
            response.prefixed_message(&self.clients[id].full_name(), Command::Mode)
                .param(self.clients[target_id].nick())
                .param(&applied);
            let msg = MessageQueueItem::from(response);
            self.send(target_id, msg.clone());
            if target_id != id {
                self.send(id, msg);
            }
        }
        Ok(())
    }

    pub fn cmd_motd(&self, id: ClientId) -> HandlerResult {
        let mut response = ResponseBuffer::new();
        let nick = self.clients[id].nick();
        if let Some(ref motd) = self.motd {
            log::debug!("{}: Sending motd", id);
            lines::motd_start(response.prefixed_message(&self.domain, rpl::MOTDSTART).param(nick),
                              &self.domain);
            for line in motd.lines() {
                let mut msg = response.prefixed_message(&self.domain, rpl::MOTD).param(nick);
                let trailing = msg.raw_trailing_param();
                trailing.push_str("- ");
                trailing.push_str(line);
            }
            response.prefixed_message(&self.domain, rpl::ENDOFMOTD)
                .param(nick)
                .trailing_param(lines::END_OF_MOTD);
        } else {
            log::debug!("{}: Sending no-motd error", id);
            response.prefixed_message(&self.domain, rpl::ERR_NOMOTD)
                .param(nick)
                .trailing_param(lines::NO_MOTD);
        }
        self.send(id, MessageQueueItem::from(response));
        Ok(())
    }

    pub fn cmd_names(&self, id: ClientId, targets: &str) -> HandlerResult {
        log::debug!("{}: NAMES {:?}", id, targets);
        if targets.is_empty() {
            for channel in self.channels.values() {
                if channel.is_public() || channel.members.contains_key(&id) {
                    self.send_names(id, &channel.name);
                }
            }
        } else {
            for target in targets.split(',').filter(|target| !target.is_empty()) {
                self.send_names(id, target);
            }
        }
        Ok(())
    }

    pub fn cmd_nick(&mut self, id: ClientId, nick: &str) -> HandlerResult {
        log::debug!("{}: NICK {:?}", id, nick);
        if nick.is_empty() {
            self.send_reply(id, rpl::ERR_NONICKNAMEGIVEN, &[lines::NO_NICKNAME_GIVEN]);
            return Err(());
        }
        if !is_valid_nickname(nick, self.nicklen) {
            self.send_reply(id, rpl::ERR_ERRONEUSNICKNAME, &[nick, lines::ERRONEOUS_NICKNAME]);
            return Err(());
        }
        let in_use = self.clients.iter()
            .any(|(other, client)| other != id && u(client.nick()) == u(nick));
        if in_use {
            self.send_reply(id, rpl::ERR_NICKNAMEINUSE, &[nick, lines::NICKNAME_IN_USE]);
            return Err(());
        }
        if self.clients[id].nick() == nick {
            return Ok(());
        }

        if !self.clients[id].is_registered() {
            self.clients[id].set_nick(nick);
            return Ok(());
        }

        let full_name = self.clients[id].full_name();
        self.clients[id].set_nick(nick);

        let mut response = ResponseBuffer::new();
        response.prefixed_message(&full_name, Command::Nick).param(nick);
        let msg = MessageQueueItem::from(response);

        let mut receivers: HashSet<ClientId> = HashSet::new();
        receivers.insert(id);
        for channel in self.channels.values() {
            if channel.members.contains_key(&id) {
                receivers.extend(channel.members.keys());
            }
        }
        for receiver in receivers {
            self.send(receiver, msg.clone());
        }
        self.relay_to_links(None, msg);
        Ok(())
    }

    pub fn cmd_notice(&mut self, id: ClientId, target: &str, content: &str) -> HandlerResult {
        self.cmd_privmsg_notice(id, Command::Notice, target, content)
    }

    pub fn cmd_privmsg(&mut self, id: ClientId, target: &str, content: &str) -> HandlerResult {
        self.cmd_privmsg_notice(id, Command::PrivMsg, target, content)
    }

    /// PRIVMSG and NOTICE share delivery rules; NOTICE never generates error replies.
    fn cmd_privmsg_notice(&mut self, id: ClientId, cmd: Command, target: &str,
                          content: &str) -> HandlerResult {
        log::debug!("{}: {} to {:?}", id, cmd.as_str(), target);
        if content.is_empty() {
            if cmd == Command::PrivMsg {
                self.send_reply(id, rpl::ERR_NOTEXTTOSEND, &[lines::NO_TEXT_TO_SEND]);
            }
            return Err(());
        }
        self.clients[id].last_action_time = time();

        if is_valid_channel_name(target) {
            let can_talk = match self.channels.get(u(target)) {
                Some(channel) => channel.can_talk(id),
                None => {
                    if cmd == Command::PrivMsg {
                        self.send_reply(id, rpl::ERR_NOSUCHNICK, &[target, lines::NO_SUCH_NICK]);
                    }
                    return Err(());
                }
            };
            if !can_talk {
                if cmd == Command::PrivMsg {
                    self.send_reply(id, rpl::ERR_CANNOTSENDTOCHAN,
                                    &[target, lines::CANNOT_SEND_TO_CHAN]);
                }
                return Err(());
            }
            let mut response = ResponseBuffer::new();
            response.prefixed_message(&self.clients[id].full_name(), cmd)
                .param(target)
                .trailing_param(content);
            let msg = MessageQueueItem::from(response);
            let channel = &self.channels[u(target)];
            for member in channel.members.keys().filter(|member| **member != id) {
                self.send(*member, msg.clone());
            }
        } else {
            let found = self.clients.iter()
                .find(|(_, client)| client.is_registered() && u(client.nick()) == u(target));
            let (target_id, target_client) = match found {
                Some(found) => found,
                None => {
                    if cmd == Command::PrivMsg {
                        self.send_reply(id, rpl::ERR_NOSUCHNICK, &[target, lines::NO_SUCH_NICK]);
                    }
                    return Err(());
                }
            };
            if target_client.is_local() {
                let mut response = ResponseBuffer::new();
                response.prefixed_message(&self.clients[id].full_name(), cmd)
                    .param(target)
                    .trailing_param(content);
                self.send(target_id, MessageQueueItem::from(response));
            } else if let Some(via) = self.route(&target_client.server) {
                // Server links identify users by nick alone.
                let mut relay = ResponseBuffer::new();
                relay.prefixed_message(self.clients[id].nick(), cmd)
                    .param(target)
                    .trailing_param(content);
                self.send(via, MessageQueueItem::from(relay));
            }
            if cmd == Command::PrivMsg {
                if let Some(ref away) = target_client.away_message {
                    self.send_reply(id, rpl::AWAY, &[target, away]);
                }
            }
        }
        Ok(())
    }

    pub fn cmd_oper(&mut self, id: ClientId, name: &str, password: &str) -> HandlerResult {
        log::debug!("{}: OPER {:?}", id, name);
        let oper = self.opers.iter().find(|oper| oper.name == name);
        match oper {
            Some(oper) => {
                self.clients[id].awaiting_verify = true;
                self.pending.push(Pending::Oper {
                    id,
                    hash: oper.password.clone(),
                    given: password.to_owned(),
                });
                Ok(())
            }
            None => {
                log::debug!("{}:         no such oper", id);
                self.send_reply(id, rpl::ERR_PASSWDMISMATCH, &[lines::PASSWORD_MISMATCH]);
                Err(())
            }
        }
    }

    pub fn cmd_part(&mut self, id: ClientId, targets: &str, reason: &str) -> HandlerResult {
        log::debug!("{}: PART {:?} {:?}", id, targets, reason);
        for target in targets.split(',').filter(|target| !target.is_empty()) {
            let _ = self.part_one(id, target, reason);
        }
        Ok(())
    }

    fn part_one(&mut self, id: ClientId, target: &str, reason: &str) -> HandlerResult {
        let is_member = self.channels.get(u(target))
            .map_or(false, |channel| channel.members.contains_key(&id));
        if !is_member {
            if self.channels.contains_key(u(target)) {
                self.send_reply(id, rpl::ERR_NOTONCHANNEL, &[target, lines::NOT_ON_CHANNEL]);
            } else {
                self.send_reply(id, rpl::ERR_NOSUCHCHANNEL, &[target, lines::NO_SUCH_CHANNEL]);
            }
            return Err(());
        }

        let mut response = ResponseBuffer::new();
        {
            let msg = response.prefixed_message(&self.clients[id].full_name(), Command::Part)
                .param(target);
            if !reason.is_empty() {
                msg.trailing_param(reason);
            }
        }
        self.broadcast(target, MessageQueueItem::from(response));

        let channel = self.channels.get_mut(u(target)).unwrap();
        channel.remove_member(id);
        if channel.members.is_empty() {
            self.channels.remove(u(target));
        }
        self.clients[id].channels.retain(|name| u(name.as_str()) != u(target));
        Ok(())
    }

    pub fn cmd_pass(&mut self, id: ClientId, password: &str) -> HandlerResult {
        log::debug!("{}: PASS", id);
        let client = &mut self.clients[id];
        client.given_password = Some(password.to_owned());
        if client.on_link_port {
            return Ok(());
        }
        if let Some(ref hash) = self.password {
            client.awaiting_verify = true;
            self.pending.push(Pending::Pass {
                id,
                hash: hash.clone(),
                given: password.to_owned(),
            });
        }
        Ok(())
    }

    pub fn cmd_ping(&self, id: ClientId, payload: &str) -> HandlerResult {
        let mut response = ResponseBuffer::new();
        response.prefixed_message(&self.domain, Command::Pong)
            .param(&self.domain)
            .trailing_param(payload);
        self.send(id, MessageQueueItem::from(response));
        Ok(())
    }

    pub fn cmd_quit(&mut self, id: ClientId, reason: &str) -> HandlerResult {
        log::debug!("{}: QUIT {:?}", id, reason);
        let mut client = self.clients.remove(id);
        client.set_quit_message(if reason.is_empty() { None } else { Some(reason) });
        let reason = client.quit_message().to_owned();
        let mut error = ResponseBuffer::new();
        error.prefixed_message(&self.domain, "ERROR").trailing_param(lines::CLOSING_LINK);
        let _ = client.send(error);
        self.remove_client(id, client, Some(reason));
        Err(())
    }

    pub fn cmd_time(&self, id: ClientId) -> HandlerResult {
        log::debug!("{}: TIME", id);
        self.send_reply(id, rpl::TIME, &[&self.domain, &time_str()]);
        Ok(())
    }

    pub fn cmd_topic(&mut self, id: ClientId, target: &str,
                     topic: Option<&str>) -> HandlerResult {
        log::debug!("{}: TOPIC {:?} {:?}", id, target, topic);
        match topic {
            Some(topic) => self.cmd_topic_set(id, target, topic),
            None => self.cmd_topic_get(id, target),
        }
    }

    fn cmd_topic_set(&mut self, id: ClientId, target: &str, topic: &str) -> HandlerResult {
        let check = match self.channels.get(u(target)) {
            None => Some((rpl::ERR_NOSUCHCHANNEL, lines::NO_SUCH_CHANNEL)),
            Some(channel) => match channel.members.get(&id) {
                None => Some((rpl::ERR_NOTONCHANNEL, lines::NOT_ON_CHANNEL)),
                Some(member) if channel.topic_restricted && !member.can_moderate() =>
                    Some((rpl::ERR_CHANOPRIVSNEEDED, lines::CHAN_O_PRIVS_NEEDED)),
                Some(_) => None,
            },
        };
        if let Some((reply, text)) = check {
            self.send_reply(id, reply, &[target, text]);
            return Err(());
        }

        let full_name = self.clients[id].full_name();
        let channel = self.channels.get_mut(u(target)).unwrap();
        channel.topic = if topic.is_empty() { None } else { Some(topic.to_owned()) };

        let mut response = ResponseBuffer::new();
        response.prefixed_message(&full_name, Command::Topic)
            .param(target)
            .trailing_param(topic);
        self.broadcast(target, MessageQueueItem::from(response));
        Ok(())
    }

    fn cmd_topic_get(&self, id: ClientId, target: &str) -> HandlerResult {
        let channel = self.find_channel(id, target)?;
        if !channel.is_public() && !channel.members.contains_key(&id) {
            self.send_reply(id, rpl::ERR_NOTONCHANNEL, &[target, lines::NOT_ON_CHANNEL]);
            return Err(());
        }
        self.send_topic(id, target);
        Ok(())
    }

    pub fn cmd_user(&mut self, id: ClientId, user: &str, real: &str) -> HandlerResult {
        log::debug!("{}: USER {:?} {:?}", id, user, real);
        // Only reachable on the link port, where PASS is not checked against the connection
        // password.
        if self.password.is_some() && !self.clients[id].password_accepted
            && self.clients[id].on_link_port
        {
            self.send_reply(id, rpl::ERR_PASSWDMISMATCH, &[lines::PASSWORD_MISMATCH]);
            return Err(());
        }
        self.clients[id].set_user_real(user, real);
        Ok(())
    }

    pub fn cmd_version(&self, id: ClientId) -> HandlerResult {
        log::debug!("{}: VERSION", id);
        self.send_reply(id, rpl::VERSION, &[SERVER_VERSION, &self.domain]);
        Ok(())
    }

    pub fn cmd_wallops(&self, id: ClientId, text: &str) -> HandlerResult {
        log::debug!("{}: WALLOPS {:?}", id, text);
        if !self.clients[id].is_operator() {
            self.send_reply(id, rpl::ERR_NOPRIVILEGES, &[lines::NO_PRIVILEGES]);
            return Err(());
        }
        let mut response = ResponseBuffer::new();
        response.prefixed_message(&self.clients[id].full_name(), Command::Wallops)
            .trailing_param(text);
        let msg = MessageQueueItem::from(response);
        for (other, client) in self.clients.iter() {
            if client.is_local() && client.is_registered() && client.receives_wallops() {
                self.send(other, msg.clone());
            }
        }
        Ok(())
    }

    pub fn cmd_who(&self, id: ClientId, mask: &str, o: &str) -> HandlerResult {
        log::debug!("{}: WHO {:?} {:?}", id, mask, o);
        let mask = if mask.is_empty() { "*" } else { mask };
        let opers_only = o == "o";
        let nick = self.clients[id].nick().to_owned();
        let requester_is_oper = self.clients[id].is_operator();
        let mut response = ResponseBuffer::new();

        if is_valid_channel_name(mask) {
            if let Some(channel) = self.channels.get(u(mask)) {
                let requester_in = channel.members.contains_key(&id);
                if requester_in || channel.is_public() {
                    for (member, member_modes) in &channel.members {
                        let target = &self.clients[*member];
                        if opers_only && !target.is_operator() {
                            continue;
                        }
                        if target.is_invisible() && !requester_in && !requester_is_oper
                            && *member != id
                        {
                            continue;
                        }
                        self.who_line(&mut response, &nick, mask, target, member_modes.symbol());
                    }
                }
            }
        } else {
            for (other, target) in self.clients.iter() {
                if !target.is_registered() || !mask_match(mask, target.nick()) {
                    continue;
                }
                if opers_only && !target.is_operator() {
                    continue;
                }
                if target.is_invisible() && other != id && !requester_is_oper
                    && !self.share_channel(id, other)
                {
                    continue;
                }
                self.who_line(&mut response, &nick, "*", target, None);
            }
        }
        response.prefixed_message(&self.domain, rpl::ENDOFWHO)
            .param(&nick)
            .param(mask)
            .trailing_param(lines::END_OF_WHO);
        self.send(id, MessageQueueItem::from(response));
        Ok(())
    }

    fn who_line(&self, response: &mut ResponseBuffer, requester: &str, channel: &str,
                target: &Client, symbol: Option<char>) {
        let mut flags = String::with_capacity(3);
        flags.push(if target.away_message.is_some() { 'G' } else { 'H' });
        if target.is_operator() {
            flags.push('*');
        }
        if let Some(symbol) = symbol {
            flags.push(symbol);
        }
        let mut msg = response.prefixed_message(&self.domain, rpl::WHOREPLY)
            .param(requester)
            .param(channel)
            .param(target.user())
            .param(target.host())
            .param(&target.server)
            .param(target.nick())
            .param(&flags);
        let trailing = msg.raw_trailing_param();
        trailing.push_str(&target.hop_count.to_string());
        trailing.push(' ');
        trailing.push_str(target.real());
    }

    pub fn cmd_whois(&self, id: ClientId, nick: &str) -> HandlerResult {
        log::debug!("{}: WHOIS {:?}", id, nick);
        let (target_id, target) = self.find_nick(id, nick)?;
        let client_nick = self.clients[id].nick();
        let mut response = ResponseBuffer::new();

        response.prefixed_message(&self.domain, rpl::WHOISUSER)
            .param(client_nick)
            .param(target.nick())
            .param(target.user())
            .param(target.host())
            .param("*")
            .trailing_param(target.real());

        let mut names = String::new();
        for channel_name in &target.channels {
            if let Some(channel) = self.channels.get(u(channel_name.as_str())) {
                if !channel.is_public() && !channel.members.contains_key(&id) {
                    continue;
                }
                if let Some(member_modes) = channel.members.get(&target_id) {
                    if let Some(symbol) = member_modes.symbol() {
                        names.push(symbol);
                    }
                }
                names.push_str(channel_name);
                names.push(' ');
            }
        }
        if !names.is_empty() {
            names.pop();
            response.prefixed_message(&self.domain, rpl::WHOISCHANNELS)
                .param(client_nick)
                .param(target.nick())
                .trailing_param(&names);
        }

        let server_info = if u(target.server.as_str()) == u(self.domain.as_str()) {
            self.description.clone()
        } else {
            self.servers.get(u(target.server.as_str()))
                .map_or_else(String::new, |server| server.description.clone())
        };
        response.prefixed_message(&self.domain, rpl::WHOISSERVER)
            .param(client_nick)
            .param(target.nick())
            .param(&target.server)
            .trailing_param(&server_info);

        if let Some(ref away) = target.away_message {
            response.prefixed_message(&self.domain, rpl::AWAY)
                .param(client_nick)
                .param(target.nick())
                .trailing_param(away);
        }
        if target.is_operator() {
            response.prefixed_message(&self.domain, rpl::WHOISOPERATOR)
                .param(client_nick)
                .param(target.nick())
                .trailing_param(lines::WHOIS_OPERATOR);
        }
        if target.is_local() {
            response.prefixed_message(&self.domain, rpl::WHOISIDLE)
                .param(client_nick)
                .param(target.nick())
                .param(&time().saturating_sub(target.last_action_time).to_string())
                .param(&target.signon_time.to_string())
                .trailing_param(lines::WHOIS_IDLE);
        }
        response.prefixed_message(&self.domain, rpl::ENDOFWHOIS)
            .param(client_nick)
            .param(target.nick())
            .trailing_param(lines::END_OF_WHOIS);
        self.send(id, MessageQueueItem::from(response));
        Ok(())
    }

    pub fn cmd_whowas(&self, id: ClientId, nicks: &str, count: &str) -> HandlerResult {
        log::debug!("{}: WHOWAS {:?} {:?}", id, nicks, count);
        let limit = count.parse::<usize>().unwrap_or(0);
        let client_nick = self.clients[id].nick();
        let mut response = ResponseBuffer::new();
        let mut found = false;

        for nick in nicks.split(',').filter(|nick| !nick.is_empty()) {
            let mut sent = 0;
            for entry in self.history.iter().filter(|entry| u(entry.nick.as_str()) == u(nick)) {
                response.prefixed_message(&self.domain, rpl::WHOWASUSER)
                    .param(client_nick)
                    .param(&entry.nick)
                    .param(&entry.user)
                    .param(&entry.host)
                    .param("*")
                    .trailing_param(&entry.real);
                found = true;
                sent += 1;
                if limit != 0 && sent == limit {
                    break;
                }
            }
        }
        if !found {
            response.prefixed_message(&self.domain, rpl::ERR_WASNOSUCHNICK)
                .param(client_nick)
                .param(nicks)
                .trailing_param(lines::WAS_NO_SUCH_NICK);
        }
        response.prefixed_message(&self.domain, rpl::ENDOFWHOWAS)
            .param(client_nick)
            .param(nicks)
            .trailing_param(lines::END_OF_WHOWAS);
        self.send(id, MessageQueueItem::from(response));
        Ok(())
    }
}
