//! Terminal setup and RAII restoration for the dashboard.
//!
//! [`Tui`] wraps a ratatui terminal. Creating it enters raw mode and the
//! alternate screen; dropping it restores the terminal. In between the screen
//! can be handed back temporarily with [`Tui::suspend`] and [`Tui::resume`],
//! which is how an external editor is launched on `package.json`.
//!
//! Call [`install_panic_hook`] once before creating a [`Tui`] so a panic
//! message is printed to a usable terminal.

use std::io::{self, Stdout};
use std::panic;

use crossterm::{
    cursor::{Hide, Show},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};

/// Installs a panic hook that restores the terminal before the panic message
/// is printed, then delegates to the previous hook.
pub fn install_panic_hook() {
    let previous_hook = panic::take_hook();

    panic::set_hook(Box::new(move |panic_info| {
        // Best effort; the terminal may be in any state here
        let _ = leave_screen();
        previous_hook(panic_info);
    }));
}

fn enter_screen() -> io::Result<()> {
    enable_raw_mode()?;
    if let Err(e) = execute!(io::stdout(), EnterAlternateScreen, Hide) {
        let _ = disable_raw_mode();
        return Err(e);
    }
    Ok(())
}

fn leave_screen() -> io::Result<()> {
    execute!(io::stdout(), Show, LeaveAlternateScreen)?;
    disable_raw_mode()
}

/// A ratatui terminal in raw mode on the alternate screen.
pub struct Tui {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    /// `true` while the normal screen is active (suspended or restored).
    released: bool,
}

impl Tui {
    /// Enters raw mode and the alternate screen.
    ///
    /// # Errors
    ///
    /// Returns an error if any terminal initialization step fails; the
    /// terminal is restored before returning.
    pub fn new() -> io::Result<Self> {
        enter_screen()?;

        let terminal = match Terminal::new(CrosstermBackend::new(io::stdout())) {
            Ok(terminal) => terminal,
            Err(e) => {
                let _ = leave_screen();
                return Err(e);
            }
        };

        Ok(Self {
            terminal,
            released: false,
        })
    }

    /// Draws a frame.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering fails.
    pub fn draw<F>(&mut self, f: F) -> io::Result<()>
    where
        F: FnOnce(&mut ratatui::Frame),
    {
        self.terminal.draw(f)?;
        Ok(())
    }

    /// Hands the normal screen back, e.g. to run an editor in the foreground.
    ///
    /// # Errors
    ///
    /// Returns an error if the terminal cannot be restored.
    pub fn suspend(&mut self) -> io::Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        leave_screen()
    }

    /// Re-enters the alternate screen after [`Tui::suspend`] and forces a
    /// full redraw.
    ///
    /// # Errors
    ///
    /// Returns an error if raw mode or the alternate screen cannot be entered.
    pub fn resume(&mut self) -> io::Result<()> {
        if !self.released {
            return Ok(());
        }
        enter_screen()?;
        self.released = false;
        self.terminal.clear()
    }

    /// Restores the terminal for good. Later drops are no-ops.
    ///
    /// # Errors
    ///
    /// Returns an error if any restoration step fails.
    pub fn restore(&mut self) -> io::Result<()> {
        self.suspend()
    }
}

impl Drop for Tui {
    fn drop(&mut self) {
        if !self.released {
            let _ = leave_screen();
        }
    }
}
