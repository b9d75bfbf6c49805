//! Chunk planning: fold queued commands into as few round-trips as the parameter ceiling allows.

use crate::command::Command;
use crate::parameter::Parameter;
use crate::translation::inline_literals;
use crate::types::CommandKind;

/// Text joining merged statements inside one chunk.
pub const STATEMENT_SEPARATOR: &str = "\n";

/// Appended to a merged statement that does not already end with one.
pub const STATEMENT_TERMINATOR: char = ';';

/// One planned physical round-trip.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Merged SQL text (or the procedure / table name for a non-text chunk).
    pub sql: String,
    /// Every bound parameter, ids already suffixed to match `sql`.
    pub parameters: Vec<Parameter>,
    /// `Text` for merged chunks; the command's own kind for a lone procedure or table.
    pub kind: CommandKind,
    /// Run as a reader when any emitted command is expected to return rows.
    pub finalizable: bool,
    /// Batch indices of the header commands replayed at the top of this chunk.
    pub headers: Vec<usize>,
    /// Batch indices of the ordinary commands folded into this chunk, in order.
    pub commands: Vec<usize>,
    starter: String,
    display: String,
}

impl Chunk {
    fn empty(kind: CommandKind, starter: &str) -> Self {
        Self {
            sql: String::new(),
            parameters: Vec::new(),
            kind,
            finalizable: false,
            headers: Vec::new(),
            commands: Vec::new(),
            starter: starter.to_string(),
            display: String::new(),
        }
    }

    fn lone(command: &Command, starter: &str) -> Self {
        let mut chunk = Self::empty(command.kind(), starter);
        chunk.sql = command.sql_text().to_string();
        chunk.display = command.sql_text().to_string();
        chunk.parameters = command.parameters().to_vec();
        chunk.finalizable = command.finalizable();
        chunk
    }

    fn push_text(&mut self, command: &Command, suffix: &str) {
        if !self.sql.is_empty() {
            self.sql.push_str(STATEMENT_SEPARATOR);
            self.display.push_str(STATEMENT_SEPARATOR);
        }
        let text = command.merged_text(suffix);
        self.sql.push_str(&text);
        terminate(&mut self.sql);
        self.display.push_str(&text);
        self.parameters.extend(command.merged_parameters(suffix));
        self.finalizable |= command.finalizable();
    }

    /// Number of commands (headers included) emitted into this chunk.
    #[must_use]
    pub fn command_count(&self) -> usize {
        self.headers.len() + self.commands.len()
    }

    /// The chunk's SQL with every parameter inlined as a literal.
    #[must_use]
    pub fn to_display_string(&self) -> String {
        inline_literals(&self.display, &self.starter, &self.parameters).into_owned()
    }
}

/// Close the last statement in `sql` so the next one can follow it.
///
/// A trailing line comment would swallow the terminator, so it goes on its own line then.
fn terminate(sql: &mut String) {
    let trimmed = sql.trim_end();
    if trimmed.ends_with(STATEMENT_TERMINATOR) {
        return;
    }
    let last_line = trimmed.rsplit('\n').next().unwrap_or_default();
    if last_line.contains("--") {
        sql.push('\n');
    }
    sql.push(STATEMENT_TERMINATOR);
}

/// Disambiguator appended to the parameters of the command at `index`.
#[must_use]
pub fn command_suffix(index: usize) -> String {
    format!("Command{index}")
}

/// Disambiguator appended to the parameters of the header at `index`.
#[must_use]
pub fn header_suffix(index: usize) -> String {
    format!("Header{index}")
}

/// Plan the physical chunks for `commands`.
///
/// Headers are replayed at the top of every text chunk and count toward its parameter total.
/// Each merged statement is terminated so the backend sees separate statements. Ordinary commands are folded in queue order while the running total stays
/// within `ceiling`; a command that would push it over starts the next chunk. A command that
/// exceeds the ceiling on its own still runs, alone. Commands with no text are never emitted.
/// Procedure and table commands cannot be concatenated and always run alone, without headers.
#[must_use]
pub fn plan_chunks(commands: &[Command], ceiling: usize, starter: &str) -> Vec<Chunk> {
    let headers: Vec<usize> = commands
        .iter()
        .enumerate()
        .filter(|(_, c)| c.is_header() && !c.is_empty())
        .map(|(i, _)| i)
        .collect();
    let header_params: usize = headers.iter().map(|&i| commands[i].parameter_count()).sum();
    let ordinary: Vec<usize> = commands
        .iter()
        .enumerate()
        .filter(|(_, c)| !c.is_header() && !c.is_empty())
        .map(|(i, _)| i)
        .collect();

    let start_text_chunk = || {
        let mut chunk = Chunk::empty(CommandKind::Text, starter);
        for &h in &headers {
            chunk.push_text(&commands[h], &header_suffix(h));
            chunk.headers.push(h);
        }
        chunk
    };

    let mut chunks = Vec::new();
    if ordinary.is_empty() {
        if !headers.is_empty() {
            chunks.push(start_text_chunk());
        }
        return chunks;
    }

    let mut cursor = 0;
    while cursor < ordinary.len() {
        let first = &commands[ordinary[cursor]];
        if first.kind() != CommandKind::Text {
            let mut chunk = Chunk::lone(first, starter);
            chunk.commands.push(ordinary[cursor]);
            chunks.push(chunk);
            cursor += 1;
            continue;
        }

        let mut chunk = start_text_chunk();
        let mut running = header_params;
        while cursor < ordinary.len() {
            let index = ordinary[cursor];
            let command = &commands[index];
            if command.kind() != CommandKind::Text {
                break;
            }
            let count = command.parameter_count();
            if running + count > ceiling {
                if !chunk.commands.is_empty() {
                    break;
                }
                tracing::warn!(
                    command = index,
                    parameters = count,
                    header_parameters = header_params,
                    ceiling,
                    "command exceeds the parameter ceiling on its own; sending it alone"
                );
            }
            chunk.push_text(command, &command_suffix(index));
            chunk.commands.push(index);
            running += count;
            cursor += 1;
        }
        chunks.push(chunk);
    }
    chunks
}
