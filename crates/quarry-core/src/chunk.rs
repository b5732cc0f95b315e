//! Line-boundary text chunker.
//!
//! Splits long file content into windows bounded by a character budget,
//! with an optional character overlap carried between consecutive chunks to
//! preserve context across boundaries. This is a one-shot batch transform,
//! not a lazy stream: chunk boundaries depend on lookahead.
//!
//! # Algorithm
//!
//! 1. Split the input into lines.
//! 2. Greedily accumulate lines into a buffer until appending the next line
//!    would exceed `max_chars`, then flush the buffer as a chunk.
//! 3. Seed the next buffer with the trailing lines of the previous chunk
//!    covering up to `overlap` characters.
//! 4. A single line longer than `max_chars` becomes its own chunk; lines are
//!    never split mid-line.
//!
//! # Guarantees
//!
//! - Empty or whitespace-only input produces no chunks.
//! - Input no longer than `max_chars` produces exactly one trimmed chunk.
//! - Every chunk is at most `max_chars + overlap + 1` characters long,
//!   except oversized single lines, which pass through whole.
//! - `overlap` is clamped below `max_chars`, so the scan always advances.

/// Split `text` into chunks of at most `max_chars` characters (plus overlap
/// margin), re-including up to `overlap` characters of trailing lines from
/// the previous chunk.
pub fn chunk_text(text: &str, max_chars: usize, overlap: usize) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() || max_chars == 0 {
        return Vec::new();
    }
    if text.len() <= max_chars {
        return vec![text.to_string()];
    }

    // Termination guard: a full-size overlap would re-ingest an entire chunk.
    let overlap = overlap.min(max_chars - 1);

    let mut chunks: Vec<String> = Vec::new();
    let mut buf: Vec<&str> = Vec::new();
    let mut buf_len = 0usize;
    let mut fresh_lines = 0usize;

    for line in text.lines() {
        let line = line.trim_end();

        if line.len() > max_chars {
            if fresh_lines > 0 {
                chunks.push(buf.join("\n"));
            }
            buf.clear();
            buf_len = 0;
            fresh_lines = 0;
            chunks.push(line.to_string());
            continue;
        }

        let added = if buf.is_empty() {
            line.len()
        } else {
            line.len() + 1
        };

        if !buf.is_empty() && buf_len + added > max_chars {
            if fresh_lines > 0 {
                chunks.push(buf.join("\n"));
                let (carried, carried_len) = carry_overlap(&buf, overlap);
                buf = carried;
                buf_len = carried_len;
            } else {
                // Buffer holds only carried overlap; flushing it would emit
                // a chunk of already-emitted lines. Restart at this line.
                buf.clear();
                buf_len = 0;
            }
            fresh_lines = 0;
        }

        buf_len += if buf.is_empty() {
            line.len()
        } else {
            line.len() + 1
        };
        buf.push(line);
        fresh_lines += 1;
    }

    // The tail is only worth emitting if it holds lines not already covered
    // by the previous flush.
    if fresh_lines > 0 {
        let tail = buf.join("\n");
        if !tail.trim().is_empty() {
            chunks.push(tail);
        }
    }

    chunks
}

/// Select the trailing lines of `buf` whose joined length stays within
/// `overlap` characters. Returns the lines in original order plus their
/// joined length.
fn carry_overlap<'a>(buf: &[&'a str], overlap: usize) -> (Vec<&'a str>, usize) {
    let mut carried: Vec<&str> = Vec::new();
    let mut carried_len = 0usize;

    for line in buf.iter().rev() {
        let added = if carried.is_empty() {
            line.len()
        } else {
            line.len() + 1
        };
        if carried_len + added > overlap {
            break;
        }
        carried_len += added;
        carried.push(line);
    }

    carried.reverse();
    (carried, carried_len)
}
