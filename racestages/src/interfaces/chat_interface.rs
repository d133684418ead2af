use std::io::Write;

/// Token at the start of a chat line that lets race control throw a caution flag.
pub const CAUTION_COMMAND: &str = "!y";

/// Token at the start of a chat line that broadcasts it to everybody.
pub const BROADCAST_COMMAND: &str = "/all";

/// Every chat line is submitted with a carriage return.
pub const CHAT_LINE_TERMINATOR: char = '\r';

/// ChatTransport is the capability to type into the simulator chat. The calls are fire-and-forget:
/// an Ok only means the command was issued, the simulator does not acknowledge anything.
pub trait ChatTransport {
    /// Opens an interactive chat composition.
    fn open_session(&mut self) -> anyhow::Result<()>;

    /// Types one complete line (including its terminator) into the open composition.
    fn transmit(&mut self, line: &str) -> anyhow::Result<()>;

    /// Cancels the open composition.
    fn cancel_session(&mut self) -> anyhow::Result<()>;
}

/// ConsoleTransport writes the chat traffic to a writer (stdout by default) instead of a
/// simulator window, e.g. for replays and demonstrations.
pub struct ConsoleTransport<W: Write> {
    out: W,
}

impl ConsoleTransport<std::io::Stdout> {
    pub fn stdout() -> Self {
        ConsoleTransport {
            out: std::io::stdout(),
        }
    }
}

impl<W: Write> ConsoleTransport<W> {
    pub fn new(out: W) -> Self {
        ConsoleTransport { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ChatTransport for ConsoleTransport<W> {
    fn open_session(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn transmit(&mut self, line: &str) -> anyhow::Result<()> {
        writeln!(self.out, "CHAT: {}", line.trim_end_matches(CHAT_LINE_TERMINATOR))?;
        self.out.flush()?;
        Ok(())
    }

    fn cancel_session(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}
