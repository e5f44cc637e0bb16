//! Regenerate program text from statements

use std::ops::RangeInclusive;

use indexmap::IndexSet;
use uuid::Uuid;

use crate::statement::Statement;

/// Regenerated program text and where each statement landed in it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneratedCode {
    /// Imports, then definitions, then the body; sections separated by a
    /// blank line
    pub source: String,
    /// Deduplicated import lines
    pub imports: Vec<String>,
    /// Deduplicated function definitions
    pub locals: Vec<String>,
    /// Body text
    pub body: String,
    /// 1-based line range of each statement in `source`
    pub lines: Vec<(Uuid, RangeInclusive<usize>)>,
}

impl GeneratedCode {
    /// Statement owning a 1-based line of `source`.
    pub fn statement_at(&self, line: usize) -> Option<Uuid> {
        self.lines
            .iter()
            .find(|(_, range)| range.contains(&line))
            .map(|(uuid, _)| *uuid)
    }

    /// Import and definition sections, without the body.
    pub fn imports_and_locals(&self) -> String {
        let mut sections = Vec::new();
        if !self.imports.is_empty() {
            sections.push(self.imports.join("\n"));
        }
        sections.extend(self.locals.iter().map(|d| d.trim_end().to_string()));
        sections.join("\n\n")
    }
}

/// Emit `statements` in `order`.
pub fn generate(statements: &[Statement], order: &[usize]) -> GeneratedCode {
    let mut imports: IndexSet<String> = IndexSet::new();
    let mut locals: IndexSet<String> = IndexSet::new();
    for stmt in statements {
        imports.extend(stmt.imports());
        locals.extend(stmt.locals().into_iter().map(|d| d.trim_end().to_string() + "\n"));
    }

    let mut code = GeneratedCode {
        imports: imports.into_iter().collect(),
        locals: locals.into_iter().collect(),
        ..GeneratedCode::default()
    };
    let head = code.imports_and_locals();
    let mut line = if head.is_empty() {
        1
    } else {
        head.lines().count() + 2
    };

    let mut body = Vec::new();
    for &pos in order {
        let Some(stmt) = statements.get(pos) else {
            continue;
        };
        let signature = stmt.call_signature();
        if signature.is_empty() {
            continue;
        }
        let height = signature.lines().count().max(1);
        code.lines.push((stmt.uuid(), line..=line + height - 1));
        line += height;
        body.push(signature);
    }
    code.body = body.join("\n");

    let mut source = head;
    if !code.body.is_empty() {
        if !source.is_empty() {
            source.push_str("\n\n");
        }
        source.push_str(&code.body);
    }
    if !source.is_empty() {
        source.push('\n');
    }
    code.source = source;
    code
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::GeneralExpression;

    fn stmt(code: &str) -> Statement {
        Statement::from(GeneralExpression::new(code).unwrap())
    }

    #[test]
    fn test_sections_and_line_map() {
        let statements = vec![
            stmt("import math\nr = math.sqrt(x)"),
            stmt("def sq(v):\n    return v * v\ns = sq(r)"),
            stmt("import math\nt = math.pi"),
        ];
        let code = generate(&statements, &[0, 1, 2]);
        assert_eq!(
            code.source,
            "import math\n\ndef sq(v):\n    return v * v\n\nr = math.sqrt(x)\ns = sq(r)\nt = math.pi\n"
        );
        assert_eq!(code.statement_at(6), Some(statements[0].uuid()));
        assert_eq!(code.statement_at(8), Some(statements[2].uuid()));
        assert_eq!(code.statement_at(1), None);
    }

    #[test]
    fn test_body_only() {
        let statements = vec![stmt("a = 1"), stmt("b = a")];
        let code = generate(&statements, &[1, 0]);
        assert_eq!(code.source, "b = a\na = 1\n");
        assert_eq!(code.statement_at(1), Some(statements[1].uuid()));
    }

    #[test]
    fn test_empty() {
        assert_eq!(generate(&[], &[]).source, "");
    }
}
