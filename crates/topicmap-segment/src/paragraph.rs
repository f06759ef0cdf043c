/// Paragraph-preserving chunking on blank lines.
///
/// Paragraphs are packed into chunks of at most `max_chars` characters (joined by a blank
/// line). A single paragraph longer than `max_chars` is sliced at the character limit.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    chunk_pieces(text, max_chars).into_iter().map(|(_, piece)| piece).collect()
}

/// Same chunks as [`chunk_text`], each paired with the byte offset in `text` where its
/// first character sits.
pub fn chunk_pieces(text: &str, max_chars: usize) -> Vec<(usize, String)> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_start = 0usize;
    let mut current_len = 0usize;

    let mut offset = 0usize;
    for raw in text.split("\n\n") {
        let raw_start = offset;
        offset += raw.len() + 2;
        let para = raw.trim();
        if para.is_empty() { continue; }
        let para_start = raw_start + (raw.len() - raw.trim_start().len());

        let len = para.chars().count();
        if len > max_chars {
            if !current.is_empty() { chunks.push((current_start, std::mem::take(&mut current))); current_len = 0; }
            let mut slice_start = para_start;
            let mut slice = String::new();
            for (i, c) in para.chars().enumerate() {
                if i > 0 && i % max_chars == 0 {
                    let done = std::mem::take(&mut slice);
                    let next = slice_start + done.len();
                    chunks.push((slice_start, done));
                    slice_start = next;
                }
                slice.push(c);
            }
            chunks.push((slice_start, slice));
            continue;
        }
        if !current.is_empty() && current_len + len + 2 > max_chars {
            chunks.push((current_start, std::mem::take(&mut current)));
            current_len = 0;
        }
        if current.is_empty() {
            current_start = para_start;
        } else {
            current.push_str("\n\n");
            current_len += 2;
        }
        current.push_str(para);
        current_len += len;
    }
    if !current.is_empty() { chunks.push((current_start, current)); }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_paragraphs_without_splitting() {
        let text = "alpha beta\n\ngamma\n\n\n\ndelta epsilon";
        assert_eq!(chunk_text(text, 100), vec!["alpha beta\n\ngamma\n\ndelta epsilon"]);
        assert_eq!(chunk_text(text, 17), vec!["alpha beta\n\ngamma", "delta epsilon"]);
    }

    #[test]
    fn oversized_paragraph_is_sliced_on_char_boundaries() {
        let text = format!("short\n\n{}", "é".repeat(25));
        let chunks = chunk_text(&text, 10);
        assert_eq!(chunks[0], "short");
        assert_eq!(chunks[1..].iter().map(|c| c.chars().count()).collect::<Vec<_>>(), vec![10, 10, 5]);
    }

    #[test]
    fn pieces_point_at_their_first_paragraph() {
        let text = "  lead\n\n\n\nnext one\n\nxyzxyzxyz";
        let pieces = chunk_pieces(text, 6);
        let starts: Vec<_> = pieces.iter().map(|p| (p.0, p.1.as_str())).collect();
        assert_eq!(starts, vec![(2, "lead"), (10, "next o"), (16, "ne"), (20, "xyzxyz"), (26, "xyz")]);
        for (start, piece) in &pieces { assert!(text[*start..].starts_with(piece.as_str())); }
    }

    #[test]
    fn blank_text_has_no_chunks() {
        assert!(chunk_text("  \n\n \n\n", 50).is_empty());
    }
}
