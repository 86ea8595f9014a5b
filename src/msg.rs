use crossterm::event::KeyEvent;

use crate::package::installer::InstallReport;

/// All possible messages that drive wizard transitions.
#[derive(Debug)]
pub enum Msg {
    // -- Input events (raw)
    Key(KeyEvent),
    Redraw,

    // -- Installation
    InstallFinished(Result<InstallReport, String>),

    // -- System
    Tick,
}
