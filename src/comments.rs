//! Comment & Blank-Line Interleaver
//!
//! Replays Lua comments and blank lines into the generated JS at the
//! positions the node walk reaches them. The queue is sorted once at
//! construction and only ever consumed from the front.

use std::collections::VecDeque;

use crate::ast::{Comment, Location};

pub struct CommentInterleaver {
    queue: VecDeque<Comment>,
    last_line: u32,
}

impl CommentInterleaver {
    pub fn new(mut comments: Vec<Comment>) -> Self {
        comments.sort_by_key(|c| (c.loc.start.line, c.loc.start.column));
        Self {
            queue: comments.into(),
            last_line: 0,
        }
    }

    pub fn remaining(&self) -> usize {
        self.queue.len()
    }

    /// Comments and blank lines between the last visited line and `loc`.
    ///
    /// Comments left behind on earlier lines (for example inside the tail of a
    /// function body) are drained here too, so nothing is skipped.
    pub fn before(&mut self, loc: Location) -> String {
        let target = loc.start.line;
        let mut out = String::new();
        let mut line = self.last_line + 1;

        while let Some(head) = self.queue.front() {
            if head.loc.start.line >= target {
                break;
            }
            while line < head.loc.start.line {
                out.push('\n');
                line += 1;
            }
            out.push_str(&leading_comment(head));
            out.push('\n');
            line = line.max(head.loc.end.line + 1);
            self.queue.pop_front();
        }

        while line < target {
            out.push('\n');
            line += 1;
        }

        self.last_line = self.last_line.max(target);
        out
    }

    /// Comments sitting on the node's last line, as trailing comments.
    pub fn after(&mut self, loc: Location) -> String {
        let end = loc.end.line;
        let mut out = String::new();

        while let Some(head) = self.queue.front() {
            if head.loc.start.line != end {
                break;
            }
            out.push_str(&trailing_comment(head));
            out.push('\n');
            self.last_line = self.last_line.max(head.loc.end.line);
            self.queue.pop_front();
        }

        self.last_line = self.last_line.max(end);
        out
    }

    /// Everything still queued, e.g. comments after the last statement.
    pub fn flush(&mut self) -> String {
        let mut out = String::new();
        while let Some(comment) = self.queue.pop_front() {
            out.push_str(&leading_comment(&comment));
            out.push('\n');
        }
        out
    }
}

fn leading_comment(comment: &Comment) -> String {
    if comment.is_block {
        format!("/*{}*/", comment.value.replace("*/", "* /"))
    } else {
        format!("//{}", comment.value)
    }
}

fn trailing_comment(comment: &Comment) -> String {
    if comment.is_block && comment.value.contains('\n') {
        leading_comment(comment)
    } else {
        format!("//{}", comment.value.replace('\n', " "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Position;

    fn comment(value: &str, is_block: bool, start: (u32, u32), end: (u32, u32)) -> Comment {
        Comment {
            value: value.to_string(),
            raw: String::new(),
            is_block,
            loc: Location::new(Position::new(start.0, start.1), Position::new(end.0, end.1)),
        }
    }

    fn line(start: u32, end: u32) -> Location {
        Location::new(Position::new(start, 0), Position::new(end, 10))
    }

    #[test]
    fn test_blank_lines_and_leading_comment() {
        let mut interleaver = CommentInterleaver::new(vec![comment(" hi", false, (2, 0), (2, 5))]);
        assert_eq!(interleaver.before(line(1, 1)), "");
        assert_eq!(interleaver.after(line(1, 1)), "");
        assert_eq!(interleaver.before(line(4, 4)), "// hi\n\n");
        assert_eq!(interleaver.remaining(), 0);
    }

    #[test]
    fn test_queue_is_sorted_before_consumption() {
        let mut interleaver = CommentInterleaver::new(vec![
            comment(" b", false, (3, 0), (3, 4)),
            comment(" a", false, (2, 0), (2, 4)),
        ]);
        interleaver.before(line(1, 1));
        assert_eq!(interleaver.before(line(4, 4)), "// a\n// b\n");
    }

    #[test]
    fn test_trailing_comments_on_end_line() {
        let mut interleaver = CommentInterleaver::new(vec![
            comment(" one", false, (1, 8), (1, 14)),
            comment(" two", true, (1, 20), (1, 30)),
        ]);
        interleaver.before(line(1, 1));
        assert_eq!(interleaver.after(line(1, 1)), "// one\n// two\n");
    }

    #[test]
    fn test_multiline_block_comment_keeps_block_form() {
        let mut interleaver =
            CommentInterleaver::new(vec![comment(" a\n b ", true, (1, 6), (2, 5))]);
        interleaver.before(line(1, 1));
        assert_eq!(interleaver.after(line(1, 1)), "/* a\n b */\n");
        // Line 2 is covered by the comment, no extra blank line.
        assert_eq!(interleaver.before(line(3, 3)), "");
    }

    #[test]
    fn test_stale_comment_is_not_dropped() {
        let mut interleaver = CommentInterleaver::new(vec![comment(" tail", false, (3, 2), (3, 9))]);
        interleaver.before(line(1, 1));
        interleaver.before(line(2, 2));
        // The enclosing node ends past the comment without visiting its line.
        interleaver.after(line(1, 4));
        assert_eq!(interleaver.before(line(5, 5)), "// tail\n");
    }

    #[test]
    fn test_flush_emits_leftovers_once() {
        let mut interleaver = CommentInterleaver::new(vec![comment(" end", false, (9, 0), (9, 6))]);
        interleaver.before(line(1, 1));
        assert_eq!(interleaver.flush(), "// end\n");
        assert_eq!(interleaver.flush(), "");
    }
}
