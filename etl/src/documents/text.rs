//! Segmentation of long body text into bounded-length content fragments.

/// Splits text into fragments no longer than `max_len` characters, breaking
/// on sentence-ish boundaries (a `.` or `,` followed by whitespace).
///
/// Fragments preserve the original sentence order and collapse the
/// separators between packed sentences to single spaces. A single sentence
/// longer than `max_len` becomes its own fragment rather than being cut.
pub fn split_text(text: &str, max_len: usize) -> Vec<String> {
    let mut parts = vec![];
    let mut current = String::new();

    for sentence in split_sentences(text) {
        if current.is_empty() {
            current.push_str(sentence);
        } else if current.len() + sentence.len() + 1 > max_len {
            parts.push(std::mem::take(&mut current));
            current.push_str(sentence);
        } else {
            current.push(' ');
            current.push_str(sentence);
        }
    }

    if !current.is_empty() {
        parts.push(current);
    }

    parts
}

/// Splits text after every `.` or `,` that is followed by whitespace.
///
/// The punctuation stays attached to its sentence and the whitespace run is
/// consumed.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = vec![];
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((index, c)) = chars.next() {
        let boundary = (c == '.' || c == ',')
            && chars
                .peek()
                .is_some_and(|(_, next)| next.is_whitespace());
        if !boundary {
            continue;
        }

        let end = index + c.len_utf8();
        if start < end {
            sentences.push(&text[start..end]);
        }

        start = text.len();
        while let Some(&(next_index, next)) = chars.peek() {
            if next.is_whitespace() {
                chars.next();
            } else {
                start = next_index;
                break;
            }
        }
    }

    if start < text.len() {
        sentences.push(&text[start..]);
    }

    sentences
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragments_respect_the_length_bound() {
        let parts = split_text("A, B, C.", 5);

        assert!(parts.len() > 1);
        assert!(parts.iter().all(|part| part.len() <= 5));
        assert_eq!(parts.join(" "), "A, B, C.");
    }

    #[test]
    fn oversized_sentence_becomes_its_own_fragment() {
        let parts = split_text("ab, this sentence is far too long to fit, cd.", 10);

        assert_eq!(
            parts,
            vec![
                "ab,".to_owned(),
                "this sentence is far too long to fit,".to_owned(),
                "cd.".to_owned(),
            ]
        );
    }

    #[test]
    fn text_without_boundaries_is_one_fragment() {
        let parts = split_text("no boundary punctuation here", 10);
        assert_eq!(parts, vec!["no boundary punctuation here".to_owned()]);
    }

    #[test]
    fn empty_text_yields_no_fragments() {
        assert!(split_text("", 250).is_empty());
    }

    #[test]
    fn punctuation_without_trailing_whitespace_does_not_split() {
        let parts = split_text("1,5 is a decimal. 2,5 too.", 12);
        assert_eq!(parts.join(" "), "1,5 is a decimal. 2,5 too.");
    }
}
