//! Terminal key input
//!
//! Crossterm-backed [`KeySource`] for the interactive stop key. Raw mode is
//! enabled while the source lives and restored on drop.

use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::io::{self, IsTerminal};
use std::time::Duration;

use crate::bench::cancel::{KeySource, STOP_KEY};

/// Key source reading from the controlling terminal
pub struct TerminalKeys {
    raw_mode: bool,
}

impl TerminalKeys {
    /// Open the terminal; `None` when stdin is not a TTY
    pub fn open() -> io::Result<Option<Self>> {
        if !io::stdin().is_terminal() {
            return Ok(None);
        }

        enable_raw_mode()?;
        let keys = Self { raw_mode: true };
        #[cfg(unix)]
        keep_output_processing()?;
        Ok(Some(keys))
    }

    /// Restore cooked mode
    pub fn restore(&mut self) -> io::Result<()> {
        if self.raw_mode {
            disable_raw_mode()?;
            self.raw_mode = false;
        }
        Ok(())
    }
}

/// Raw mode also turns off newline translation, which would garble the
/// log lines and progress output written while keys are watched.
#[cfg(unix)]
fn keep_output_processing() -> io::Result<()> {
    use std::os::fd::AsRawFd;

    let fd = io::stdin().as_raw_fd();
    let mut termios = std::mem::MaybeUninit::<libc::termios>::uninit();
    // SAFETY: tcgetattr fully initializes `termios` when it returns 0
    unsafe {
        if libc::tcgetattr(fd, termios.as_mut_ptr()) != 0 {
            return Err(io::Error::last_os_error());
        }
        let mut termios = termios.assume_init();
        termios.c_oflag |= libc::OPOST | libc::ONLCR;
        if libc::tcsetattr(fd, libc::TCSANOW, &termios) != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

impl KeySource for TerminalKeys {
    fn next_key(&mut self, timeout: Duration) -> io::Result<Option<char>> {
        if !event::poll(timeout)? {
            return Ok(None);
        }

        match event::read()? {
            Event::Key(key) if key.kind == KeyEventKind::Press => match key.code {
                // Raw mode swallows SIGINT, so Ctrl-C arrives here as a key
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    Ok(Some(STOP_KEY))
                }
                KeyCode::Char(c) => Ok(Some(c)),
                KeyCode::Esc => Ok(Some(STOP_KEY)),
                _ => Ok(None),
            },
            _ => Ok(None),
        }
    }
}

impl Drop for TerminalKeys {
    fn drop(&mut self) {
        // Ensure terminal is restored even if restore() wasn't called
        let _ = self.restore();
    }
}
