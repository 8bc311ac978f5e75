use kaede_unicase::scrub;
use std::time;

pub fn time_str() -> String {
    chrono::Local::now().to_rfc2822()
}

pub fn time() -> u64 {
    match time::SystemTime::now().duration_since(time::UNIX_EPOCH) {
        Ok(unix_time) => unix_time.as_secs(),
        Err(_) => {
            log::error!("Computer clock set before 01/01/1970?");
            0
        }
    }
}

pub fn time_ms() -> u64 {
    match time::SystemTime::now().duration_since(time::UNIX_EPOCH) {
        Ok(unix_time) => unix_time.as_millis() as u64,
        Err(_) => 0,
    }
}

/// Matches `subject` against a `nick!user@host`-shaped pattern.
///
/// `*` matches any run of characters, `?` matches exactly one.  Comparisons follow IRC
/// casemapping, the same as nickname lookups.
pub fn mask_match(pattern: &str, subject: &str) -> bool {
    let p = pattern.as_bytes();
    let s = subject.as_bytes();
    let mut pi = 0;
    let mut si = 0;
    let mut star = None;
    let mut star_si = 0;

    while si < s.len() {
        if pi < p.len() && (p[pi] == b'?' || scrub(p[pi]) == scrub(s[si])) {
            pi += 1;
            si += 1;
        } else if pi < p.len() && p[pi] == b'*' {
            star = Some(pi);
            star_si = si;
            pi += 1;
        } else if let Some(sp) = star {
            // Backtrack: let the last * swallow one more character.
            pi = sp + 1;
            star_si += 1;
            si = star_si;
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == b'*' {
        pi += 1;
    }
    pi == p.len()
}
