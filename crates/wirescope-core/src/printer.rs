//! Line-buffered pretty printing for the disassembler.
//!
//! The printer buffers output one line at a time so the disassembler can
//! do the surgery its heuristics require: collapse short blocks onto one
//! line, fold packed arrays into columns, rewind speculative output, and
//! rewrite a group opener after the fact. Lines are mutable until
//! [`Printer::finish`] renders them.

/// A single line in the output stream.
#[derive(Debug, Default, Clone)]
pub(crate) struct Line {
    /// The line's in-progress text. The disassembler mutates this directly
    /// when it rewrites group openers and closers.
    pub(crate) text: String,
    pub(crate) remarks: Vec<String>,
    /// How the *next* line's indentation differs from this one's.
    indent: i32,
    /// How many folded blocks this line absorbed.
    folds: i32,
}

impl Line {
    fn width(&self) -> usize {
        self.text.chars().count()
    }
}

/// A saved point in the line buffer for speculative decoding.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Mark {
    lines: usize,
    blocks: usize,
}

/// Parameters for one indentation block.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BlockInfo {
    /// Whether the block starts and ends with delimiters that need no
    /// surrounding spaces when folded, allowing `{x}` instead of `{ x }`.
    pub(crate) has_delimiters: bool,
    /// The maximum height (in lines, including the opener) that will be
    /// folded onto a single line.
    pub(crate) height_to_fold_at: usize,
    /// The line, zero-indexed from the last, that should be the final
    /// indented one. Blocks shorter than this are not indented at all.
    pub(crate) unindent_at: usize,
}

#[derive(Debug)]
struct OpenBlock {
    info: BlockInfo,
    start: usize,
}

/// An indentation and block aware line printer.
#[derive(Debug)]
pub(crate) struct Printer {
    /// Spaces per indentation level.
    indent: usize,
    /// Nested folded blocks allowed before a block stays expanded.
    max_folds: i32,
    lines: Vec<Line>,
    blocks: Vec<OpenBlock>,
}

impl Printer {
    pub(crate) fn new(indent: usize, max_folds: i32) -> Self {
        Printer {
            indent,
            max_folds,
            lines: Vec::new(),
            blocks: Vec::new(),
        }
    }

    /// Pushes a fresh line.
    pub(crate) fn new_line(&mut self) {
        self.lines.push(Line::default());
    }

    /// Discards the current line.
    pub(crate) fn discard_line(&mut self) {
        self.lines.pop();
    }

    /// The current line.
    pub(crate) fn current_mut(&mut self) -> &mut Line {
        self.lines.last_mut().expect("printer has no current line")
    }

    /// The line at `index` (as returned by [`Printer::drop_block`]).
    pub(crate) fn line_mut(&mut self, index: usize) -> &mut Line {
        &mut self.lines[index]
    }

    /// Appends text to the current line.
    pub(crate) fn write(&mut self, text: impl AsRef<str>) {
        self.current_mut().text.push_str(text.as_ref());
    }

    /// Attaches a remark to the current line.
    pub(crate) fn remark(&mut self, text: impl Into<String>) {
        self.current_mut().remarks.push(text.into());
    }

    /// Saves a point to [`Printer::reset`] to.
    pub(crate) fn mark(&self) -> Mark {
        Mark {
            lines: self.lines.len(),
            blocks: self.blocks.len(),
        }
    }

    /// Discards all lines and blocks opened after `mark`.
    pub(crate) fn reset(&mut self, mark: Mark) {
        self.lines.truncate(mark.lines);
        self.blocks.truncate(mark.blocks);
    }

    /// Starts an indentation block anchored at the current line.
    pub(crate) fn start_block(&mut self, info: BlockInfo) {
        let start = self.lines.len() - 1;
        debug_assert_eq!(self.lines[start].indent, 0, "start_block called twice");
        self.blocks.push(OpenBlock { info, start });
        self.lines[start].indent += 1;
    }

    /// Discards the current block, undoing its indentation. Returns the
    /// index of the block's starting line so the caller can rewrite it.
    pub(crate) fn drop_block(&mut self) -> usize {
        let block = self.blocks.pop().expect("drop_block without start_block");
        self.lines[block.start].indent -= 1;
        block.start
    }

    /// Finishes the innermost block, folding it onto its starting line if
    /// it is short enough.
    pub(crate) fn end_block(&mut self) {
        let block = self.blocks.pop().expect("end_block without start_block");
        let info = block.info;
        let height = self.lines.len() - block.start;

        'fold: {
            if height > info.height_to_fold_at || height < 2 {
                break 'fold;
            }

            let mut folds = 0;
            let mut remarks = 0;
            for line in &self.lines[block.start..] {
                folds += line.folds;
                if !line.remarks.is_empty() {
                    remarks += 1;
                }
            }
            if self.max_folds >= 0 && folds >= self.max_folds {
                break 'fold;
            }
            // Folding would mix remarks from different lines.
            if remarks > 1 {
                break 'fold;
            }

            let tail = self.lines.split_off(block.start + 1);
            let start = &mut self.lines[block.start];
            let inner = tail.len();
            for (i, line) in tail.into_iter().enumerate() {
                if (i != 0 && i != inner - 1) || !info.has_delimiters {
                    start.text.push(' ');
                }
                start.text.push_str(&line.text);
                if !line.remarks.is_empty() {
                    start.remarks = line.remarks;
                }
            }
            start.folds = folds + 1;
        }

        // Unindentation must re-measure: a successful fold changed the
        // block's height.
        let height = self.lines.len() - block.start;
        if height <= info.unindent_at {
            self.lines[block.start].indent -= 1;
        } else {
            let index = self.lines.len() - 1 - info.unindent_at;
            self.lines[index].indent -= 1;
        }
    }

    /// Folds the last `count` lines into rows of up to `cols` columns,
    /// right-aligning each column. A remark-bearing line flushes the
    /// current row so remarks never merge.
    pub(crate) fn fold_into_columns(&mut self, cols: usize, count: usize) {
        let mut to_fold: Vec<Line> = self.lines.split_off(self.lines.len() - count);
        let mut widths = vec![0usize; cols];

        while !to_fold.is_empty() {
            widths.fill(0);

            let mut end = to_fold.len();
            for (i, line) in to_fold.iter().enumerate() {
                if !line.remarks.is_empty() {
                    end = i;
                    break;
                }
                let width = line.width();
                if width > widths[i % cols] {
                    widths[i % cols] = width;
                }
            }
            if end == 0 {
                end = 1;
            }

            let chunk: Vec<Line> = to_fold.drain(..end).collect();
            for (i, line) in chunk.into_iter().enumerate() {
                if i % cols == 0 {
                    self.new_line();
                } else {
                    self.current_mut().text.push(' ');
                }
                let pad = widths[i % cols].saturating_sub(line.width());
                for _ in 0..pad {
                    self.current_mut().text.push(' ');
                }
                self.current_mut().text.push_str(&line.text);
                if !line.remarks.is_empty() {
                    self.current_mut().remarks = line.remarks;
                }
            }
        }
    }

    /// Renders the buffered lines.
    ///
    /// Remarks on contiguous lines are aligned to a shared column, rounded
    /// up to an indent-unit multiple; a run is broken early when an indent
    /// change inside it would push the column further out than starting
    /// fresh would.
    pub(crate) fn finish(self) -> String {
        debug_assert!(self.blocks.is_empty(), "finish with open blocks");

        let unit = self.indent as i32;
        let mut out = String::new();
        let mut indent = 0i32;
        let mut comment_col = -1i32;
        let mut comment_col_until = -1i64;

        for (i, line) in self.lines.iter().enumerate() {
            if !line.remarks.is_empty() && comment_col_until < i as i64 {
                let mut run_indent = indent;
                comment_col = -1;
                for (j, run_line) in self.lines[i..].iter().enumerate() {
                    if run_line.remarks.is_empty() {
                        comment_col_until = (j + i) as i64;
                        break;
                    }
                    let line_len = run_indent * unit + run_line.width() as i32;
                    run_indent += run_line.indent;
                    if line_len > comment_col {
                        if j > 1 && run_line.indent != 0 {
                            comment_col_until = (j + i) as i64;
                            break;
                        }
                        comment_col = line_len;
                    }
                }
                let over = comment_col % unit;
                if over != 0 {
                    comment_col += unit - over;
                }
            }

            for _ in 0..(indent * unit).max(0) {
                out.push(' ');
            }
            out.push_str(&line.text);

            if !line.remarks.is_empty() {
                let needed = comment_col - indent * unit - line.width() as i32;
                for _ in 0..needed.max(0) {
                    out.push(' ');
                }
                out.push_str("  # ");
                out.push_str(&line.remarks.join(", "));
            }

            indent += line.indent;
            out.push('\n');
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delimited(height_to_fold_at: usize) -> BlockInfo {
        BlockInfo {
            has_delimiters: true,
            height_to_fold_at,
            unindent_at: 1,
        }
    }

    #[test]
    fn plain_lines() {
        let mut p = Printer::new(2, 3);
        p.new_line();
        p.write("1: 42");
        p.new_line();
        p.write("2: 43");
        assert_eq!(p.finish(), "1: 42\n2: 43\n");
    }

    #[test]
    fn expanded_block_indents() {
        let mut p = Printer::new(2, 3);
        p.new_line();
        p.write("1: {");
        p.start_block(delimited(2));
        for i in 0..3 {
            p.new_line();
            p.write(format!("{i}: 1"));
        }
        p.new_line();
        p.write("}");
        p.end_block();
        assert_eq!(p.finish(), "1: {\n  0: 1\n  1: 1\n  2: 1\n}\n");
    }

    #[test]
    fn short_block_folds() {
        let mut p = Printer::new(2, 3);
        p.new_line();
        p.write("1: {");
        p.start_block(delimited(3));
        p.new_line();
        p.write("\"text\"");
        p.new_line();
        p.write("}");
        p.end_block();
        assert_eq!(p.finish(), "1: {\"text\"}\n");
    }

    #[test]
    fn empty_block_folds_tight() {
        let mut p = Printer::new(2, 3);
        p.new_line();
        p.write("1: {");
        p.start_block(delimited(3));
        p.new_line();
        p.write("}");
        p.end_block();
        assert_eq!(p.finish(), "1: {}\n");
    }

    #[test]
    fn nested_folds_stop_at_the_cap() {
        // Four foldable blocks, three allowed folds: the innermost three
        // collapse, the outermost absorbs too many and stays expanded.
        let mut p = Printer::new(2, 3);
        for number in [1, 2, 3, 4] {
            p.new_line();
            p.write(format!("{number}: {{"));
            p.start_block(delimited(3));
        }
        p.new_line();
        p.write("\"x\"");
        for _ in 0..4 {
            p.new_line();
            p.write("}");
            p.end_block();
        }
        assert_eq!(p.finish(), "1: {\n  2: {3: {4: {\"x\"}}}\n}\n");
    }

    #[test]
    fn non_delimited_fold_keeps_spaces() {
        let mut p = Printer::new(2, 3);
        p.new_line();
        p.write("1:SGROUP");
        p.start_block(BlockInfo {
            has_delimiters: false,
            height_to_fold_at: 3,
            unindent_at: 1,
        });
        p.new_line();
        p.write("2: 5");
        p.new_line();
        p.write("1:EGROUP");
        p.end_block();
        assert_eq!(p.finish(), "1:SGROUP 2: 5 1:EGROUP\n");
    }

    #[test]
    fn fold_declined_when_remarks_would_merge() {
        let mut p = Printer::new(2, 3);
        p.new_line();
        p.write("1: {");
        p.start_block(delimited(4));
        p.new_line();
        p.write("2: 5");
        p.remark("a");
        p.new_line();
        p.write("3: 6");
        p.remark("b");
        p.new_line();
        p.write("}");
        p.end_block();
        assert_eq!(p.finish(), "1: {\n  2: 5  # a\n  3: 6  # b\n}\n");
    }

    #[test]
    fn mark_reset_discards_speculation() {
        let mut p = Printer::new(2, 3);
        p.new_line();
        p.write("1: {");
        p.start_block(delimited(3));
        let mark = p.mark();
        p.new_line();
        p.write("discarded");
        p.new_line();
        p.write("9: !{");
        p.start_block(delimited(3));
        p.reset(mark);
        p.new_line();
        p.write("\"kept\"");
        p.new_line();
        p.write("}");
        p.end_block();
        assert_eq!(p.finish(), "1: {\"kept\"}\n");
    }

    #[test]
    fn drop_block_unwinds_indent() {
        let mut p = Printer::new(2, 3);
        p.new_line();
        p.write("1: !{");
        p.start_block(delimited(3));
        p.new_line();
        p.write("2: 5");
        let start = p.drop_block();
        let line = p.line_mut(start);
        line.text.truncate(line.text.len() - 3);
        line.text.push_str("SGROUP");
        assert_eq!(p.finish(), "1:SGROUP\n2: 5\n");
    }

    #[test]
    fn remark_columns_align() {
        let mut p = Printer::new(2, 3);
        p.new_line();
        p.write("1: 1.5");
        p.remark("0x3ff8000000000000i64");
        p.new_line();
        p.write("23: 42");
        p.remark("answer");
        assert_eq!(
            p.finish(),
            "1: 1.5  # 0x3ff8000000000000i64\n23: 42  # answer\n"
        );
    }

    #[test]
    fn fold_into_columns_right_aligns() {
        let mut p = Printer::new(2, 3);
        for n in [1, 22, 333, 4, 55, 6] {
            p.new_line();
            p.write(n.to_string());
        }
        p.fold_into_columns(3, 6);
        assert_eq!(p.finish(), "1 22 333\n4 55   6\n");
    }

    #[test]
    fn fold_into_columns_flushes_at_remarks() {
        let mut p = Printer::new(2, 3);
        p.new_line();
        p.write("1");
        p.new_line();
        p.write("2");
        p.remark("two");
        p.new_line();
        p.write("3");
        p.fold_into_columns(8, 3);
        assert_eq!(p.finish(), "1\n2  # two\n3\n");
    }
}
