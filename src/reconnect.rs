//! Client-side recovery after a dropped connection
//!
//! Retries immediately, then every `delay`. Once `timeout` of wall-clock time
//! has passed the operator is asked a single time whether to keep going.

use std::io::{self, BufRead, Read, Write};
use std::time::{Duration, Instant};

use crate::codec::recv_line;
use crate::protocol::timeouts::{RECONNECT_DELAY_SECS, RECONNECT_TIMEOUT_SECS};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Wall-clock budget before the operator is asked
    pub timeout: Duration,
    /// Pause after each failed attempt
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(RECONNECT_TIMEOUT_SECS),
            delay: Duration::from_secs(RECONNECT_DELAY_SECS),
        }
    }
}

/// Operator checkpoint reached once the reconnect budget is spent.
pub trait Prompt {
    /// `true` to keep trying.
    fn confirm_continue(&mut self, waited: Duration) -> bool;
}

/// Asks on stdout and reads a `y`/`n` answer from the given input.
///
/// Borrow the shell's own reader here rather than locking stdin twice.
pub struct LinePrompt<R> {
    input: R,
}

impl<R: BufRead> LinePrompt<R> {
    pub fn new(input: R) -> Self {
        Self { input }
    }
}

impl<R: BufRead> Prompt for LinePrompt<R> {
    fn confirm_continue(&mut self, waited: Duration) -> bool {
        println!();
        println!("Connection not restored after {} s.", waited.as_secs());
        print!("Keep trying? (y/n): ");
        let _ = io::stdout().flush();
        let mut answer = String::new();
        match self.input.read_line(&mut answer) {
            Ok(0) | Err(_) => false,
            Ok(_) => answer.trim().eq_ignore_ascii_case("y"),
        }
    }
}

/// Result of a reconnect cycle.
pub enum Reconnected<S> {
    /// Fresh stream with its welcome line already consumed
    Connected { stream: S, welcome: String },
    /// Operator declined to keep waiting
    Aborted,
}

/// Re-establish a connection.
///
/// `connect` is called once per attempt; `on_attempt` sees the attempt
/// number before each call. A peer that closes before its welcome line
/// counts as a failed attempt. The prompt fires at most once per cycle.
pub fn reconnect<S, C, P, A>(
    policy: &ReconnectPolicy,
    mut connect: C,
    prompt: &mut P,
    mut on_attempt: A,
) -> Reconnected<S>
where
    S: Read,
    C: FnMut() -> io::Result<S>,
    P: Prompt + ?Sized,
    A: FnMut(u32),
{
    let start = Instant::now();
    let mut asked = false;
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let waited = start.elapsed();
        if !asked && waited >= policy.timeout {
            asked = true;
            if !prompt.confirm_continue(waited) {
                return Reconnected::Aborted;
            }
        }

        on_attempt(attempt);
        if let Ok(mut stream) = connect() {
            if let Ok(Some(welcome)) = recv_line(&mut stream) {
                return Reconnected::Connected { stream, welcome };
            }
        }
        std::thread::sleep(policy.delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    struct CountingPrompt {
        answer: bool,
        asked: u32,
    }

    impl Prompt for CountingPrompt {
        fn confirm_continue(&mut self, _waited: Duration) -> bool {
            self.asked += 1;
            self.answer
        }
    }

    fn fast_policy() -> ReconnectPolicy {
        ReconnectPolicy {
            timeout: Duration::from_millis(30),
            delay: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_immediate_success_consumes_welcome() {
        let mut prompt = CountingPrompt { answer: false, asked: 0 };
        let mut attempts = Vec::new();
        let out = reconnect(
            &fast_policy(),
            || Ok(Cursor::new(b"Hello!\r\nnext".to_vec())),
            &mut prompt,
            |n| attempts.push(n),
        );
        match out {
            Reconnected::Connected { mut stream, welcome } => {
                assert_eq!(welcome, "Hello!");
                let mut rest = String::new();
                stream.read_to_string(&mut rest).unwrap();
                assert_eq!(rest, "next");
            }
            Reconnected::Aborted => panic!("expected connection"),
        }
        assert_eq!(attempts, vec![1]);
        assert_eq!(prompt.asked, 0);
    }

    #[test]
    fn test_retries_until_success() {
        let mut prompt = CountingPrompt { answer: false, asked: 0 };
        let mut calls = 0;
        let out = reconnect(
            &ReconnectPolicy {
                timeout: Duration::from_secs(60),
                delay: Duration::from_millis(1),
            },
            || {
                calls += 1;
                match calls {
                    1 => Err(io::Error::from(io::ErrorKind::ConnectionRefused)),
                    // closes before the welcome line
                    2 => Ok(Cursor::new(Vec::new())),
                    _ => Ok(Cursor::new(b"hi\r\n".to_vec())),
                }
            },
            &mut prompt,
            |_| {},
        );
        assert!(matches!(out, Reconnected::Connected { .. }));
        assert_eq!(calls, 3);
        assert_eq!(prompt.asked, 0);
    }

    #[test]
    fn test_declining_prompt_aborts() {
        let mut prompt = CountingPrompt { answer: false, asked: 0 };
        let out: Reconnected<Cursor<Vec<u8>>> = reconnect(
            &fast_policy(),
            || Err(io::Error::from(io::ErrorKind::ConnectionRefused)),
            &mut prompt,
            |_| {},
        );
        assert!(matches!(out, Reconnected::Aborted));
        assert_eq!(prompt.asked, 1);
    }

    #[test]
    fn test_prompt_fires_once_per_cycle() {
        let mut prompt = CountingPrompt { answer: true, asked: 0 };
        let started = Instant::now();
        let out = reconnect(
            &fast_policy(),
            || {
                if started.elapsed() < Duration::from_millis(120) {
                    Err(io::Error::from(io::ErrorKind::ConnectionRefused))
                } else {
                    Ok(Cursor::new(b"welcome\r\n".to_vec()))
                }
            },
            &mut prompt,
            |_| {},
        );
        assert!(matches!(out, Reconnected::Connected { .. }));
        assert_eq!(prompt.asked, 1);
    }

    #[test]
    fn test_line_prompt_answers() {
        let mut yes = LinePrompt::new(Cursor::new(b"Y\n".to_vec()));
        assert!(yes.confirm_continue(Duration::from_secs(30)));
        let mut no = LinePrompt::new(Cursor::new(b"n\n".to_vec()));
        assert!(!no.confirm_continue(Duration::from_secs(30)));
        let mut eof = LinePrompt::new(Cursor::new(Vec::new()));
        assert!(!eof.confirm_continue(Duration::from_secs(30)));
    }
}
