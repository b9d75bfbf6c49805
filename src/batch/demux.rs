//! Routing chunk results back to the commands that produced them.

use super::merge::Chunk;
use crate::command::Command;
use crate::results::ResultSet;
use crate::types::CommandKind;

/// What one executed chunk returned.
#[derive(Debug, Clone)]
pub enum ChunkOutput {
    /// Every result set, in the order the database returned them.
    Reader(Vec<ResultSet>),
    /// Affected-row count of a chunk run as a non-query.
    NonQuery(usize),
}

/// Split chunk outputs into one result list per command, indexed like `commands`.
///
/// Within a reader chunk each finalizable command takes the next result set in emission order.
/// Headers are replayed into every chunk but only the first chunk's sets are kept for them.
/// A lone procedure or table command takes every set its chunk returned. Commands that are not
/// finalizable, were never emitted, or ran in a non-query chunk get an empty list.
pub(crate) fn demultiplex(commands: &[Command], chunks: &[Chunk], outputs: &[ChunkOutput]) -> Vec<Vec<ResultSet>> {
    let mut per_command: Vec<Vec<ResultSet>> = vec![Vec::new(); commands.len()];
    let mut headers_done = false;

    for (chunk_no, (chunk, output)) in chunks.iter().zip(outputs).enumerate() {
        let ChunkOutput::Reader(sets) = output else {
            headers_done |= !chunk.headers.is_empty();
            continue;
        };

        if chunk.kind != CommandKind::Text {
            if let Some(&index) = chunk.commands.first() {
                per_command[index] = sets.clone();
            }
            continue;
        }

        let mut available = sets.iter();
        let mut starved = 0usize;
        let emitted = chunk
            .headers
            .iter()
            .map(|&i| (i, true))
            .chain(chunk.commands.iter().map(|&i| (i, false)));
        for (index, is_header) in emitted {
            if !commands[index].finalizable() {
                continue;
            }
            match available.next() {
                Some(set) if !(is_header && headers_done) => per_command[index].push(set.clone()),
                Some(_) => {}
                None => starved += 1,
            }
        }
        headers_done |= !chunk.headers.is_empty();

        if starved > 0 {
            tracing::warn!(
                chunk = chunk_no,
                result_sets = sets.len(),
                starved,
                "fewer result sets than finalizable commands; starved commands get no rows"
            );
        } else if available.len() > 0 {
            tracing::debug!(
                chunk = chunk_no,
                extra = available.len(),
                "result sets left over after every finalizable command was served"
            );
        }
    }
    per_command
}

/// Flatten chunk outputs into the aggregate returned to the caller, in execution order.
pub(crate) fn aggregate(outputs: Vec<ChunkOutput>) -> Vec<ResultSet> {
    let mut all = Vec::new();
    for output in outputs {
        match output {
            ChunkOutput::Reader(sets) => all.extend(sets),
            ChunkOutput::NonQuery(affected) => all.push(ResultSet::affected(affected)),
        }
    }
    all
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::batch::merge::plan_chunks;
    use crate::classify::DefaultClassifier;
    use crate::parameter::Parameter;
    use crate::types::RowValues;

    fn cmd(sql: &str) -> Command {
        Command::new(sql, CommandKind::Text, Vec::new(), "@", &DefaultClassifier::new())
    }

    fn tagged(tag: i64) -> ResultSet {
        let mut rs = ResultSet::with_capacity(1);
        rs.set_column_names(Arc::new(vec!["tag".to_string()]));
        rs.add_row_values(vec![RowValues::Int(tag)]);
        rs
    }

    fn tag_of(sets: &[ResultSet]) -> Vec<i64> {
        sets.iter().filter_map(|s| s.first_value().and_then(RowValues::as_int).copied()).collect()
    }

    #[test]
    fn finalizable_commands_take_sets_in_order() {
        let commands = vec![cmd("SELECT 1"), cmd("UPDATE T SET A = 1"), cmd("SELECT 2")];
        let chunks = plan_chunks(&commands, 2000, "@");
        let outputs = vec![ChunkOutput::Reader(vec![tagged(1), tagged(2)])];
        let routed = demultiplex(&commands, &chunks, &outputs);
        assert_eq!(tag_of(&routed[0]), vec![1]);
        assert!(routed[1].is_empty());
        assert_eq!(tag_of(&routed[2]), vec![2]);
    }

    #[test]
    fn replayed_header_sets_only_count_once() {
        let select_param = |v: i64| {
            Command::new(
                "SELECT @0",
                CommandKind::Text,
                vec![Parameter::infer("0", RowValues::Int(v))],
                "@",
                &DefaultClassifier::new(),
            )
        };
        let commands = vec![cmd("SELECT 0").into_header(), select_param(1), select_param(2)];
        let chunks = plan_chunks(&commands, 1, "@");
        assert_eq!(chunks.len(), 2);
        let outputs = vec![
            ChunkOutput::Reader(vec![tagged(100), tagged(1)]),
            ChunkOutput::Reader(vec![tagged(200), tagged(2)]),
        ];
        let routed = demultiplex(&commands, &chunks, &outputs);
        assert_eq!(tag_of(&routed[0]), vec![100]);
        assert_eq!(tag_of(&routed[1]), vec![1]);
        assert_eq!(tag_of(&routed[2]), vec![2]);
        assert_eq!(aggregate(outputs).len(), 4);
    }

    #[test]
    fn missing_sets_leave_commands_empty() {
        let commands = vec![cmd("SELECT 1"), cmd("SELECT 2")];
        let chunks = plan_chunks(&commands, 2000, "@");
        let outputs = vec![ChunkOutput::Reader(vec![tagged(1)])];
        let routed = demultiplex(&commands, &chunks, &outputs);
        assert_eq!(tag_of(&routed[0]), vec![1]);
        assert!(routed[1].is_empty());
    }

    #[test]
    fn non_query_chunks_give_affected_counts() {
        let commands = vec![cmd("UPDATE T SET A = 1"), cmd("DELETE FROM T")];
        let chunks = plan_chunks(&commands, 2000, "@");
        let outputs = vec![ChunkOutput::NonQuery(7)];
        let routed = demultiplex(&commands, &chunks, &outputs);
        assert!(routed.iter().all(Vec::is_empty));
        let all = aggregate(outputs);
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].rows_affected, 7);
    }
}
