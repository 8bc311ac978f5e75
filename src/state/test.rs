//! Testing utilities for `kaede::state`, and scenario tests that drive the whole state through
//! raw IRC lines.

use super::State;
use crate::client::MessageQueueItem;
use crate::config;
use crate::message::{rpl, Command, Message};
use kaede_unicase::u;
use tokio::sync::mpsc;

pub type ClientId = usize;
pub type Queue = mpsc::UnboundedReceiver<MessageQueueItem>;

pub fn simple_state() -> State {
    State::new(config::State::sample())
}

pub async fn add_client(s: &State) -> (ClientId, Queue) {
    let (msg_queue, outgoing_msgs) = mpsc::unbounded_channel();
    let id = s.peer_joined("127.0.0.1".to_owned(), msg_queue, false).await;
    (id, outgoing_msgs)
}

pub async fn add_link_peer(s: &State) -> (ClientId, Queue) {
    let (msg_queue, outgoing_msgs) = mpsc::unbounded_channel();
    let id = s.peer_joined("10.0.0.2".to_owned(), msg_queue, true).await;
    (id, outgoing_msgs)
}

pub async fn add_registered_client(s: &State, nickname: &str) -> (ClientId, Queue) {
    let (id, queue) = add_client(s).await;
    s.handle_message(id, &format!("NICK {}", nickname)).await;
    s.handle_message(id, "USER X X X X").await;
    (id, queue)
}

pub async fn handle_message(state: &State, id: ClientId, message: &str) {
    state.handle_message(id, message).await;
}

// A disconnected queue reads as drained; the state drops the sender when it removes a client.
pub fn flush(queue: &mut Queue) {
    loop {
        match queue.try_recv() {
            Ok(_msg) => {}
            Err(_) => return,
        }
    }
}

pub fn collect(res: &mut String, queue: &mut Queue) {
    loop {
        match queue.try_recv() {
            Ok(item) => {
                let s: &str = item.as_ref();
                res.push_str(s);
            }
            Err(_) => return,
        }
    }
}

pub fn messages(s: &str) -> impl Iterator<Item = Message<'_>> {
    s.lines()
        .map(|line| Message::parse(line).expect("bad message"))
}

pub fn assert_msg(msg: &Message<'_>, prefix: Option<&str>, command: Result<Command, &str>,
                  params: &[&str]) {
    assert_eq!(msg.prefix, prefix, "prefix of {:?}", msg);
    assert_eq!(msg.command, command, "command of {:?}", msg);
    assert_eq!(msg.num_params, params.len(), "number of parameters of {:?}", msg);
    for (i, param) in params.iter().enumerate() {
        assert_eq!(&msg.params[i], param, "parameter #{} of {:?}", i, msg);
    }
}

type ExpectedMessage<'a> = (Option<&'a str>, Result<Command, &'a str>, &'a [&'a str]);

pub fn assert_msgs(s: &str, expected: &[ExpectedMessage<'_>]) {
    let mut i = 0;
    for msg in messages(s) {
        let (prefix, command, params) = expected[i];
        assert_msg(&msg, prefix, command, params);
        i += 1;
    }
    assert_eq!(i, expected.len());
}

/// The command (or reply code) of every message in `s`, in order.
pub fn commands_of(s: &str) -> Vec<&str> {
    messages(s)
        .map(|msg| match msg.command {
            Ok(cmd) => cmd.as_str(),
            Err(unknown) => unknown,
        })
        .collect()
}

fn hash(password: &str) -> String {
    use argon2::password_hash::{rand_core::OsRng, SaltString};
    use argon2::{Argon2, PasswordHasher};

    let salt = SaltString::generate(&mut OsRng);
    Argon2::default().hash_password(password.as_bytes(), &salt).unwrap().to_string()
}

const DOMAIN: Option<&str> = Some("kaede.localdomain");

#[tokio::test]
async fn test_registration_sends_welcome_burst() {
    let state = simple_state();
    let (id, mut queue) = add_client(&state).await;
    handle_message(&state, id, "NICK ser").await;
    handle_message(&state, id, "USER ser 0 * :Ser Verin").await;

    let mut res = String::new();
    collect(&mut res, &mut queue);
    assert_eq!(commands_of(&res), ["001", "002", "003", "004", "375", "372", "376"]);
    let welcome = messages(&res).next().unwrap();
    assert_msg(&welcome, DOMAIN, Err(rpl::WELCOME),
               &["ser", "Welcome to the kaede IRC Network ser!ser@127.0.0.1"]);
}

#[tokio::test]
async fn test_nick_collision_and_erroneous_nick() {
    let state = simple_state();
    let (ana, mut ana_queue) = add_registered_client(&state, "ana").await;
    let (id, mut queue) = add_client(&state).await;

    handle_message(&state, id, "NICK ana").await;
    handle_message(&state, id, "NICK 1up").await;
    handle_message(&state, id, "NICK toolongnickname").await;
    handle_message(&state, id, "NICK :").await;

    let mut res = String::new();
    collect(&mut res, &mut queue);
    assert_msgs(&res, &[
        (DOMAIN, Err(rpl::ERR_NICKNAMEINUSE), &["*", "ana", "Nickname is already in use"]),
        (DOMAIN, Err(rpl::ERR_ERRONEUSNICKNAME), &["*", "1up", "Erroneous nickname"]),
        (DOMAIN, Err(rpl::ERR_ERRONEUSNICKNAME),
         &["*", "toolongnickname", "Erroneous nickname"]),
        (DOMAIN, Err(rpl::ERR_NONICKNAMEGIVEN), &["*", "No nickname given"]),
    ]);

    // NICK to the current nick is a no-op, not a broadcast.
    flush(&mut ana_queue);
    handle_message(&state, ana, "NICK ana").await;
    let mut res = String::new();
    collect(&mut res, &mut ana_queue);
    assert_eq!(res, "");
}

#[tokio::test]
async fn test_join_names_and_topic() {
    let state = simple_state();
    let (ana, mut ana_queue) = add_registered_client(&state, "ana").await;
    let (bob, mut bob_queue) = add_registered_client(&state, "bob").await;
    flush(&mut ana_queue);
    flush(&mut bob_queue);

    handle_message(&state, ana, "JOIN #test").await;
    let mut res = String::new();
    collect(&mut res, &mut ana_queue);
    assert_msgs(&res, &[
        (Some("ana!X@127.0.0.1"), Ok(Command::Join), &["#test"]),
        (DOMAIN, Err(rpl::NOTOPIC), &["ana", "#test", "No topic is set"]),
        (DOMAIN, Err(rpl::NAMREPLY), &["ana", "=", "#test", "@ana"]),
        (DOMAIN, Err(rpl::ENDOFNAMES), &["ana", "#test", "End of /NAMES list"]),
    ]);

    handle_message(&state, bob, "JOIN #test").await;
    let mut res = String::new();
    collect(&mut res, &mut ana_queue);
    assert_msgs(&res, &[
        (Some("bob!X@127.0.0.1"), Ok(Command::Join), &["#test"]),
    ]);
    let mut res = String::new();
    collect(&mut res, &mut bob_queue);
    assert_eq!(commands_of(&res), ["JOIN", "331", "353", "366"]);
    assert!(res.contains("@ana"));
    assert!(res.contains("bob"));

    handle_message(&state, ana, "TOPIC #test :colorless green ideas").await;
    let mut res = String::new();
    collect(&mut res, &mut bob_queue);
    assert_msgs(&res, &[
        (Some("ana!X@127.0.0.1"), Ok(Command::Topic), &["#test", "colorless green ideas"]),
    ]);
    flush(&mut ana_queue);

    handle_message(&state, bob, "TOPIC #test").await;
    let mut res = String::new();
    collect(&mut res, &mut bob_queue);
    assert_msgs(&res, &[
        (DOMAIN, Err(rpl::TOPIC), &["bob", "#test", "colorless green ideas"]),
    ]);
}

#[tokio::test]
async fn test_join_checks_invite_key_limit_ban() {
    let state = simple_state();
    let (ana, mut ana_queue) = add_registered_client(&state, "ana").await;
    let (bob, mut bob_queue) = add_registered_client(&state, "bob").await;
    handle_message(&state, ana, "JOIN #priv").await;

    handle_message(&state, ana, "MODE #priv +i").await;
    handle_message(&state, bob, "JOIN #priv").await;
    flush(&mut bob_queue);

    handle_message(&state, ana, "MODE #priv -i+k sekrit").await;
    handle_message(&state, bob, "JOIN #priv").await;
    handle_message(&state, bob, "JOIN #priv wrong").await;
    let mut res = String::new();
    collect(&mut res, &mut bob_queue);
    assert_msgs(&res, &[
        (DOMAIN, Err(rpl::ERR_BADCHANKEY), &["bob", "#priv", "Cannot join channel (+k)"]),
        (DOMAIN, Err(rpl::ERR_BADCHANKEY), &["bob", "#priv", "Cannot join channel (+k)"]),
    ]);
    handle_message(&state, bob, "JOIN #priv sekrit").await;
    let mut res = String::new();
    collect(&mut res, &mut bob_queue);
    assert_eq!(commands_of(&res), ["JOIN", "331", "353", "366"]);
    handle_message(&state, bob, "PART #priv").await;
    flush(&mut bob_queue);

    handle_message(&state, ana, "MODE #priv -k sekrit").await;
    handle_message(&state, ana, "MODE #priv +l 1").await;
    handle_message(&state, bob, "JOIN #priv").await;
    let mut res = String::new();
    collect(&mut res, &mut bob_queue);
    assert_msgs(&res, &[
        (DOMAIN, Err(rpl::ERR_CHANNELISFULL), &["bob", "#priv", "Cannot join channel (+l)"]),
    ]);

    handle_message(&state, ana, "MODE #priv -l+b bob!*@*").await;
    handle_message(&state, bob, "JOIN #priv").await;
    let mut res = String::new();
    collect(&mut res, &mut bob_queue);
    assert_msgs(&res, &[
        (DOMAIN, Err(rpl::ERR_BANNEDFROMCHAN), &["bob", "#priv", "Cannot join channel (+b)"]),
    ]);

    // Failed joins earlier in the test.
    flush(&mut ana_queue);
    let inner = state.0.lock().await;
    let channel = &inner.channels[u("#priv")];
    assert!(!channel.members.contains_key(&bob));
    assert!(channel.members.contains_key(&ana));
}

#[tokio::test]
async fn test_join_limit_frees_after_part() {
    let state = simple_state();
    let (ana, _ana_queue) = add_registered_client(&state, "ana").await;
    let (bob, mut bob_queue) = add_registered_client(&state, "bob").await;
    let (cleo, _cleo_queue) = add_registered_client(&state, "cleo").await;
    handle_message(&state, ana, "JOIN #small").await;
    handle_message(&state, ana, "MODE #small +l 2").await;
    handle_message(&state, cleo, "JOIN #small").await;
    flush(&mut bob_queue);

    handle_message(&state, bob, "JOIN #small").await;
    let mut res = String::new();
    collect(&mut res, &mut bob_queue);
    assert_msgs(&res, &[
        (DOMAIN, Err(rpl::ERR_CHANNELISFULL), &["bob", "#small", "Cannot join channel (+l)"]),
    ]);

    // A PART frees a slot.
    handle_message(&state, cleo, "PART #small").await;
    handle_message(&state, bob, "JOIN #small").await;
    let mut res = String::new();
    collect(&mut res, &mut bob_queue);
    assert_eq!(commands_of(&res), ["JOIN", "331", "353", "366"]);
}

#[tokio::test]
async fn test_channel_mode_positional_params() {
    let state = simple_state();
    let (ana, mut ana_queue) = add_registered_client(&state, "ana").await;
    handle_message(&state, ana, "JOIN #m").await;
    flush(&mut ana_queue);

    handle_message(&state, ana, "MODE #m +kl sekrit 10").await;
    let mut res = String::new();
    collect(&mut res, &mut ana_queue);
    assert_msgs(&res, &[
        (Some("ana!X@127.0.0.1"), Ok(Command::Mode), &["#m", "+k+l", "sekrit", "10"]),
    ]);

    // Setting a key over an existing one is rejected.
    handle_message(&state, ana, "MODE #m +k other1").await;
    let mut res = String::new();
    collect(&mut res, &mut ana_queue);
    assert_msgs(&res, &[
        (DOMAIN, Err(rpl::ERR_KEYSET), &["ana", "#m", "Channel key already set"]),
    ]);

    handle_message(&state, ana, "MODE #m").await;
    let mut res = String::new();
    collect(&mut res, &mut ana_queue);
    assert_eq!(commands_of(&res), ["324"]);
}

#[tokio::test]
async fn test_privmsg_notice_and_away() {
    let state = simple_state();
    let (ana, mut ana_queue) = add_registered_client(&state, "ana").await;
    let (bob, mut bob_queue) = add_registered_client(&state, "bob").await;
    flush(&mut ana_queue);
    flush(&mut bob_queue);

    handle_message(&state, ana, "PRIVMSG bob :hi there").await;
    let mut res = String::new();
    collect(&mut res, &mut bob_queue);
    assert_msgs(&res, &[
        (Some("ana!X@127.0.0.1"), Ok(Command::PrivMsg), &["bob", "hi there"]),
    ]);

    handle_message(&state, bob, "AWAY :gone fishing").await;
    let mut res = String::new();
    collect(&mut res, &mut bob_queue);
    assert_msgs(&res, &[
        (DOMAIN, Err(rpl::NOWAWAY), &["bob", "You have been marked as being away"]),
    ]);
    handle_message(&state, ana, "PRIVMSG bob :anyone home?").await;
    flush(&mut bob_queue);
    let mut res = String::new();
    collect(&mut res, &mut ana_queue);
    assert_msgs(&res, &[
        (DOMAIN, Err(rpl::AWAY), &["ana", "bob", "gone fishing"]),
    ]);

    handle_message(&state, ana, "PRIVMSG carol :hello?").await;
    handle_message(&state, ana, "NOTICE carol :hello?").await;
    let mut res = String::new();
    collect(&mut res, &mut ana_queue);
    assert_msgs(&res, &[
        (DOMAIN, Err(rpl::ERR_NOSUCHNICK), &["ana", "carol", "No such nick/channel"]),
    ]);

    // NOTICE stays silent on missing parameters too; PRIVMSG errors.
    handle_message(&state, ana, "NOTICE").await;
    handle_message(&state, ana, "NOTICE bob").await;
    handle_message(&state, ana, "PRIVMSG").await;
    handle_message(&state, ana, "PRIVMSG bob").await;
    let mut res = String::new();
    collect(&mut res, &mut ana_queue);
    assert_msgs(&res, &[
        (DOMAIN, Err(rpl::ERR_NORECIPIENT), &["ana", "No recipient given"]),
        (DOMAIN, Err(rpl::ERR_NOTEXTTOSEND), &["ana", "No text to send"]),
    ]);

    // Default +n forbids messages from outside the channel.
    handle_message(&state, bob, "JOIN #quiet").await;
    flush(&mut bob_queue);
    handle_message(&state, ana, "PRIVMSG #quiet :let me in").await;
    let mut res = String::new();
    collect(&mut res, &mut ana_queue);
    assert_msgs(&res, &[
        (DOMAIN, Err(rpl::ERR_CANNOTSENDTOCHAN), &["ana", "#quiet", "Cannot send to channel"]),
    ]);

    // After joining, the message goes to the other members and is not echoed.
    handle_message(&state, ana, "JOIN #quiet").await;
    flush(&mut ana_queue);
    flush(&mut bob_queue);
    handle_message(&state, ana, "PRIVMSG #quiet :made it in").await;
    let mut res = String::new();
    collect(&mut res, &mut bob_queue);
    assert_msgs(&res, &[
        (Some("ana!X@127.0.0.1"), Ok(Command::PrivMsg), &["#quiet", "made it in"]),
    ]);
    let mut res = String::new();
    collect(&mut res, &mut ana_queue);
    assert_eq!(res, "");
}

#[tokio::test]
async fn test_who_and_whois_respect_invisible() {
    let state = simple_state();
    let (ana, mut ana_queue) = add_registered_client(&state, "ana").await;
    let (bob, mut bob_queue) = add_registered_client(&state, "bob").await;
    handle_message(&state, bob, "MODE bob +i").await;
    flush(&mut ana_queue);
    flush(&mut bob_queue);

    handle_message(&state, ana, "WHO").await;
    let mut res = String::new();
    collect(&mut res, &mut ana_queue);
    assert_eq!(commands_of(&res), ["352", "315"]);
    let who = messages(&res).next().unwrap();
    assert_msg(&who, DOMAIN, Err(rpl::WHOREPLY),
               &["ana", "*", "X", "127.0.0.1", "kaede.localdomain", "ana", "H", "0 X"]);

    handle_message(&state, ana, "JOIN #c").await;
    handle_message(&state, bob, "JOIN #c").await;
    flush(&mut ana_queue);
    handle_message(&state, ana, "WHO").await;
    let mut res = String::new();
    collect(&mut res, &mut ana_queue);
    assert_eq!(commands_of(&res), ["352", "352", "315"]);

    handle_message(&state, ana, "WHOIS bob").await;
    let mut res = String::new();
    collect(&mut res, &mut ana_queue);
    assert_eq!(commands_of(&res), ["311", "319", "312", "317", "318"]);
    let channels = messages(&res).nth(1).unwrap();
    assert_msg(&channels, DOMAIN, Err(rpl::WHOISCHANNELS), &["ana", "bob", "#c"]);
}

#[tokio::test]
async fn test_kick_and_invite() {
    let state = simple_state();
    let (ana, mut ana_queue) = add_registered_client(&state, "ana").await;
    let (bob, mut bob_queue) = add_registered_client(&state, "bob").await;
    handle_message(&state, ana, "JOIN #c").await;
    handle_message(&state, ana, "MODE #c +i").await;
    flush(&mut ana_queue);
    flush(&mut bob_queue);

    handle_message(&state, ana, "INVITE bob #c").await;
    let mut res = String::new();
    collect(&mut res, &mut ana_queue);
    assert_msgs(&res, &[
        (DOMAIN, Err(rpl::INVITING), &["ana", "#c", "bob"]),
    ]);
    let mut res = String::new();
    collect(&mut res, &mut bob_queue);
    assert_msgs(&res, &[
        (Some("ana!X@127.0.0.1"), Ok(Command::Invite), &["bob", "#c"]),
    ]);

    handle_message(&state, bob, "JOIN #c").await;
    flush(&mut ana_queue);
    flush(&mut bob_queue);

    handle_message(&state, ana, "KICK #c bob :begone").await;
    let mut res = String::new();
    collect(&mut res, &mut bob_queue);
    assert_msgs(&res, &[
        (Some("ana!X@127.0.0.1"), Ok(Command::Kick), &["#c", "bob", "begone"]),
    ]);

    // The invitation was consumed at join time, so the channel is closed again.
    handle_message(&state, bob, "JOIN #c").await;
    let mut res = String::new();
    collect(&mut res, &mut bob_queue);
    assert_msgs(&res, &[
        (DOMAIN, Err(rpl::ERR_INVITEONLYCHAN), &["bob", "#c", "Cannot join channel (+i)"]),
    ]);

    // Kicking without channel operator status fails.
    handle_message(&state, ana, "MODE #c -i").await;
    handle_message(&state, bob, "JOIN #c").await;
    flush(&mut bob_queue);
    handle_message(&state, bob, "KICK #c ana").await;
    let mut res = String::new();
    collect(&mut res, &mut bob_queue);
    assert_msgs(&res, &[
        (DOMAIN, Err(rpl::ERR_CHANOPRIVSNEEDED), &["bob", "#c", "You're not channel operator"]),
    ]);
}

#[tokio::test]
async fn test_quit_and_whowas() {
    let state = simple_state();
    let (ana, mut ana_queue) = add_registered_client(&state, "ana").await;
    let (bob, _bob_queue) = add_registered_client(&state, "bob").await;
    handle_message(&state, ana, "JOIN #c").await;
    handle_message(&state, bob, "JOIN #c").await;
    flush(&mut ana_queue);

    handle_message(&state, bob, "QUIT :gone for good").await;
    let mut res = String::new();
    collect(&mut res, &mut ana_queue);
    assert_msgs(&res, &[
        (Some("bob!X@127.0.0.1"), Ok(Command::Quit), &["gone for good"]),
    ]);

    handle_message(&state, ana, "WHOWAS bob").await;
    let mut res = String::new();
    collect(&mut res, &mut ana_queue);
    assert_msgs(&res, &[
        (DOMAIN, Err(rpl::WHOWASUSER), &["ana", "bob", "X", "127.0.0.1", "*", "X"]),
        (DOMAIN, Err(rpl::ENDOFWHOWAS), &["ana", "bob", "End of WHOWAS"]),
    ]);

    handle_message(&state, ana, "WHOWAS ghost").await;
    let mut res = String::new();
    collect(&mut res, &mut ana_queue);
    assert_msgs(&res, &[
        (DOMAIN, Err(rpl::ERR_WASNOSUCHNICK), &["ana", "ghost", "There was no such nickname"]),
        (DOMAIN, Err(rpl::ENDOFWHOWAS), &["ana", "ghost", "End of WHOWAS"]),
    ]);
}

#[tokio::test]
async fn test_oper_and_wallops() {
    let mut config = config::State::sample();
    config.opers.push(config::Oper {
        name: "root".to_owned(),
        password: hash("sekrit"),
    });
    let state = State::new(config);
    let (ana, mut ana_queue) = add_registered_client(&state, "ana").await;
    let (bob, mut bob_queue) = add_registered_client(&state, "bob").await;
    flush(&mut ana_queue);
    flush(&mut bob_queue);

    handle_message(&state, ana, "OPER root wrong").await;
    let mut res = String::new();
    collect(&mut res, &mut ana_queue);
    assert_msgs(&res, &[
        (DOMAIN, Err(rpl::ERR_PASSWDMISMATCH), &["ana", "Password incorrect"]),
    ]);

    handle_message(&state, ana, "OPER root sekrit").await;
    let mut res = String::new();
    collect(&mut res, &mut ana_queue);
    assert_msgs(&res, &[
        (DOMAIN, Ok(Command::Mode), &["ana", "+o"]),
        (DOMAIN, Err(rpl::YOUREOPER), &["ana", "You are now an IRC operator"]),
    ]);

    handle_message(&state, bob, "WALLOPS :this is not allowed").await;
    let mut res = String::new();
    collect(&mut res, &mut bob_queue);
    assert_msgs(&res, &[
        (DOMAIN, Err(rpl::ERR_NOPRIVILEGES),
         &["bob", "Permission Denied: You're not an IRC operator"]),
    ]);

    handle_message(&state, ana, "WALLOPS :maintenance in 5 minutes").await;
    let mut res = String::new();
    collect(&mut res, &mut bob_queue);
    assert_msgs(&res, &[
        (Some("ana!X@127.0.0.1"), Ok(Command::Wallops), &["maintenance in 5 minutes"]),
    ]);

    // Operators see invisible users in channels they are not on.
    handle_message(&state, bob, "MODE bob +i").await;
    handle_message(&state, bob, "JOIN #h").await;
    flush(&mut ana_queue);
    flush(&mut bob_queue);
    handle_message(&state, ana, "WHO #h").await;
    let mut res = String::new();
    collect(&mut res, &mut ana_queue);
    assert_eq!(commands_of(&res), ["352", "315"]);
}

#[tokio::test]
async fn test_connection_password_gate() {
    let mut config = config::State::sample();
    config.password = Some(hash("hunter2"));
    let state = State::new(config);

    // Lines sent before PASS are held and replayed once the password is accepted.
    let (id, mut queue) = add_client(&state).await;
    handle_message(&state, id, "NICK ana").await;
    handle_message(&state, id, "USER X X X X").await;
    let mut res = String::new();
    collect(&mut res, &mut queue);
    assert_eq!(res, "");
    handle_message(&state, id, "PASS hunter2").await;
    let mut res = String::new();
    collect(&mut res, &mut queue);
    assert_eq!(commands_of(&res), ["001", "002", "003", "004", "375", "372", "376"]);

    let (id, mut queue) = add_client(&state).await;
    handle_message(&state, id, "PASS letmein").await;
    let mut res = String::new();
    collect(&mut res, &mut queue);
    assert_msgs(&res, &[
        (DOMAIN, Err(rpl::ERR_PASSWDMISMATCH), &["*", "Password incorrect"]),
        (DOMAIN, Err("ERROR"), &["Closing link"]),
    ]);
    assert!(!state.0.lock().await.clients.contains(id));
}

fn linked_config() -> config::State {
    let mut config = config::State::sample();
    config.links.push(config::Link {
        name: "east.example.org".to_owned(),
        host: "10.0.0.2".to_owned(),
        port: 6668,
        password: "outpw".to_owned(),
        password_hash: hash("inpw"),
        token: 2,
    });
    config
}

#[tokio::test]
async fn test_link_handshake_and_burst() {
    let state = State::new(linked_config());
    let (ana, mut ana_queue) = add_registered_client(&state, "ana").await;
    flush(&mut ana_queue);

    let (peer, mut peer_queue) = add_link_peer(&state).await;
    handle_message(&state, peer, "PASS inpw 0210 kaede").await;
    handle_message(&state, peer, "SERVER east.example.org 1 2 :East side").await;

    let mut res = String::new();
    collect(&mut res, &mut peer_queue);
    assert_eq!(commands_of(&res), ["PASS", "SERVER", "NICK"]);
    let server = messages(&res).nth(1).unwrap();
    assert_msg(&server, None, Ok(Command::Server),
               &["kaede.localdomain", "1", "1", "A kaede server"]);
    let nick = messages(&res).nth(2).unwrap();
    assert_msg(&nick, None, Ok(Command::Nick),
               &["ana", "1", "X", "127.0.0.1", "1", "+w", "X"]);

    // The peer introduces one of its users; messages then route both ways.
    handle_message(&state, peer, "NICK rem 1 ruser rhost 2 + :Remote User").await;
    handle_message(&state, ana, "PRIVMSG rem :hi over there").await;
    let mut res = String::new();
    collect(&mut res, &mut peer_queue);
    assert_msgs(&res, &[
        (Some("ana"), Ok(Command::PrivMsg), &["rem", "hi over there"]),
    ]);
    handle_message(&state, peer, ":rem PRIVMSG ana :hi back").await;
    let mut res = String::new();
    collect(&mut res, &mut ana_queue);
    assert_msgs(&res, &[
        (Some("rem!ruser@rhost"), Ok(Command::PrivMsg), &["ana", "hi back"]),
    ]);

    handle_message(&state, peer, ":rem QUIT :left").await;
    handle_message(&state, ana, "WHOIS rem").await;
    let mut res = String::new();
    collect(&mut res, &mut ana_queue);
    assert_msgs(&res, &[
        (DOMAIN, Err(rpl::ERR_NOSUCHNICK), &["ana", "rem", "No such nick/channel"]),
    ]);
}

#[tokio::test]
async fn test_link_wrong_password_is_disconnected() {
    let state = State::new(linked_config());
    let (peer, mut peer_queue) = add_link_peer(&state).await;
    handle_message(&state, peer, "PASS wrong 0210 kaede").await;
    handle_message(&state, peer, "SERVER east.example.org 1 2 :East side").await;

    let mut res = String::new();
    collect(&mut res, &mut peer_queue);
    assert_eq!(commands_of(&res), ["ERROR"]);
    let inner = state.0.lock().await;
    assert!(!inner.clients.contains(peer));
    assert!(inner.servers.is_empty());
}

#[tokio::test]
async fn test_transitive_servers_and_netsplit() {
    let state = State::new(linked_config());
    let (_ana, _ana_queue) = add_registered_client(&state, "ana").await;
    let (peer, _peer_queue) = add_link_peer(&state).await;
    handle_message(&state, peer, "PASS inpw 0210 kaede").await;
    handle_message(&state, peer, "SERVER east.example.org 1 2 :East side").await;

    handle_message(&state, peer, ":east.example.org SERVER far.example.org 2 3 :Far side").await;
    // Duplicate and self announcements are dropped.
    handle_message(&state, peer, ":east.example.org SERVER far.example.org 2 3 :Far side").await;
    handle_message(&state, peer, ":east.example.org SERVER kaede.localdomain 2 9 :Not us").await;
    {
        let inner = state.0.lock().await;
        assert_eq!(inner.servers.len(), 2);
        assert_eq!(inner.servers[u("far.example.org")].hop_count, 2);
    }

    handle_message(&state, peer, "NICK rem 2 ruser rhost 3 + :On the far side").await;
    {
        let inner = state.0.lock().await;
        let (_, rem) = inner.clients.iter()
            .find(|(_, client)| client.nick() == "rem")
            .unwrap();
        assert_eq!(rem.server, "far.example.org");
    }

    // Losing the link takes both servers and their users with it.
    state.peer_quit(peer, None).await;
    let inner = state.0.lock().await;
    assert!(inner.servers.is_empty());
    assert!(!inner.clients.iter().any(|(_, client)| client.nick() == "rem"));
    assert_eq!(inner.history.iter().filter(|entry| entry.nick == "rem").count(), 1);
}
