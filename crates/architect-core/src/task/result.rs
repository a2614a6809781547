use serde::{Deserialize, Serialize};

/// The success/failure tree a task handler returns.
///
/// A result is considered failed iff `success == false` or any
/// transitive sub-result is failed, regardless of this node's own
/// `success` flag — a node can mark itself `success: true` and still be
/// reported as failed overall because one of its children failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_results: Vec<TaskResult>,
}

impl TaskResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self { success: true, message: Some(message.into()), sub_results: Vec::new() }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self { success: false, message: Some(message.into()), sub_results: Vec::new() }
    }

    pub fn with_sub_results(mut self, sub_results: Vec<TaskResult>) -> Self {
        self.sub_results = sub_results;
        self
    }

    /// Whether this node, or any descendant, failed.
    pub fn is_failed(&self) -> bool {
        !self.success || self.sub_results.iter().any(TaskResult::is_failed)
    }

    /// A multi-line, indented rendering of the tree. `[OK]`/`[FAIL]`
    /// reflects this node's own `success` flag, not the aggregate
    /// verdict, so the tree can be re-parsed losslessly by
    /// [`TaskResult::parse`].
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out, 0);
        out
    }

    fn render_into(&self, out: &mut String, depth: usize) {
        let marker = if self.success { "OK" } else { "FAIL" };
        out.push_str(&"  ".repeat(depth));
        out.push('[');
        out.push_str(marker);
        out.push(']');
        if let Some(message) = &self.message {
            out.push(' ');
            out.push_str(message);
        }
        out.push('\n');
        for sub in &self.sub_results {
            sub.render_into(out, depth + 1);
        }
    }

    /// Parses the textual rendering produced by [`TaskResult::render`]
    /// back into a tree. Indentation (two spaces per level) determines
    /// parent/child relationships.
    pub fn parse(rendered: &str) -> Option<TaskResult> {
        let lines: Vec<&str> = rendered.lines().filter(|l| !l.trim().is_empty()).collect();
        let mut index = 0;
        let (root, _) = Self::parse_node(&lines, &mut index, 0)?;
        Some(root)
    }

    fn parse_node(lines: &[&str], index: &mut usize, depth: usize) -> Option<(TaskResult, ())> {
        if *index >= lines.len() {
            return None;
        }
        let line = lines[*index];
        let indent = line.chars().take_while(|c| *c == ' ').count();
        if indent / 2 != depth {
            return None;
        }
        let content = line.trim_start();
        let (success, rest) = if let Some(rest) = content.strip_prefix("[OK]") {
            (true, rest)
        } else if let Some(rest) = content.strip_prefix("[FAIL]") {
            (false, rest)
        } else {
            return None;
        };
        let message = {
            let trimmed = rest.trim_start();
            if trimmed.is_empty() { None } else { Some(trimmed.to_string()) }
        };
        *index += 1;

        let mut sub_results = Vec::new();
        while *index < lines.len() {
            let next_indent = lines[*index].chars().take_while(|c| *c == ' ').count();
            if next_indent / 2 <= depth {
                break;
            }
            match Self::parse_node(lines, index, depth + 1) {
                Some((child, ())) => sub_results.push(child),
                None => break,
            }
        }

        Some((TaskResult { success, message, sub_results }, ()))
    }
}
