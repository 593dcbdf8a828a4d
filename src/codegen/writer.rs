//! Line-oriented, indent-aware builder for the generated TypeScript.
//!
//! Every write is a whole line; 2-space indentation.

const INDENT: &str = "  ";

#[derive(Default)]
pub struct CodeWriter {
    buf: String,
    depth: usize,
}

impl CodeWriter {
    pub fn new() -> Self {
        Self {
            buf: String::with_capacity(4096),
            depth: 0,
        }
    }

    /// A fresh writer starting one level deeper than this one, for bodies
    /// that are built before their enclosing line is known.
    pub fn nested(&self) -> CodeWriter {
        CodeWriter {
            buf: String::new(),
            depth: self.depth + 1,
        }
    }

    pub fn line(&mut self, text: &str) {
        for _ in 0..self.depth {
            self.buf.push_str(INDENT);
        }
        self.buf.push_str(text);
        self.buf.push('\n');
    }

    pub fn lines<S: AsRef<str>>(&mut self, lines: &[S]) {
        for line in lines {
            self.line(line.as_ref());
        }
    }

    /// Empty line; never indented.
    pub fn blank(&mut self) {
        self.buf.push('\n');
    }

    /// `// text`, flattened to one line.
    pub fn comment(&mut self, text: &str) {
        self.line(&format!("// {}", text.replace(['\n', '\r'], " ")));
    }

    pub fn append(&mut self, other: CodeWriter) {
        self.buf.push_str(&other.buf);
    }

    pub fn indent(&mut self) {
        self.depth += 1;
    }

    pub fn dedent(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// `text {`, then one level deeper.
    pub fn block_open(&mut self, text: &str) {
        self.line(&format!("{} {{", text));
        self.indent();
    }

    pub fn block_close(&mut self) {
        self.dedent();
        self.line("}");
    }

    /// Closes an arrow-function or object block: `};`.
    pub fn block_close_semi(&mut self) {
        self.dedent();
        self.line("};");
    }

    pub fn finish(self) -> String {
        self.buf
    }
}
