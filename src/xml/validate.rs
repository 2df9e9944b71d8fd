use crate::xml::parser::{XmlLexer, XmlToken};

/// Structural report for one record: tag-balance problems, content in
/// positions the corpus schema never produces, and the deepest nesting
/// level encountered.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub issues: Vec<String>,
    pub max_depth: usize,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Token-stream validation; never fails, lexical breakage becomes an issue.
pub fn validate(text: &str) -> ValidationReport {
    let mut report = ValidationReport::default();
    let mut lexer = XmlLexer::new(text);
    let mut stack: Vec<String> = Vec::new();
    let mut saw_root = false;

    loop {
        let token = match lexer.next_token() {
            Ok(Some(token)) => token,
            Ok(None) => break,
            Err(err) => {
                report.issues.push(err.context);
                break;
            }
        };
        match token {
            XmlToken::Open { name, .. } => {
                if stack.is_empty() {
                    if saw_root {
                        report
                            .issues
                            .push(format!("second root element <{}>", name));
                    }
                    saw_root = true;
                }
                stack.push(name.to_string());
                report.max_depth = report.max_depth.max(stack.len());
            }
            XmlToken::SelfClose { name, .. } => {
                if stack.is_empty() {
                    if saw_root {
                        report
                            .issues
                            .push(format!("second root element <{}/>", name));
                    }
                    saw_root = true;
                }
                report.max_depth = report.max_depth.max(stack.len() + 1);
            }
            XmlToken::Close { name } => match stack.pop() {
                Some(open) if open == name => {}
                Some(open) => report
                    .issues
                    .push(format!("</{}> closes <{}>", name, open)),
                None => report
                    .issues
                    .push(format!("</{}> without an open element", name)),
            },
            XmlToken::Text(text) => {
                if stack.is_empty() && !text.trim().is_empty() {
                    report.issues.push(format!(
                        "content outside the root element: {:.40}",
                        text.trim()
                    ));
                }
            }
            XmlToken::Cdata(_) => {
                if stack.is_empty() {
                    report
                        .issues
                        .push("CDATA outside the root element".to_string());
                }
            }
            XmlToken::Skip => {}
        }
    }

    for open in stack.iter().rev() {
        report.issues.push(format!("unclosed <{}>", open));
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_record_reports_depth() {
        let report = validate("<A><B><C>x</C></B><B/></A>");
        assert!(report.is_clean());
        assert_eq!(report.max_depth, 3);
    }

    #[test]
    fn unbalanced_tags_are_reported() {
        let report = validate("<A><B></A>");
        assert!(!report.is_clean());
        assert!(report.issues[0].contains("</A> closes <B>"));
    }

    #[test]
    fn misplaced_content_is_reported() {
        let report = validate("stray<A/>");
        assert!(report.issues.iter().any(|i| i.contains("outside the root")));
    }

    #[test]
    fn unclosed_elements_are_reported() {
        let report = validate("<A><B>");
        assert_eq!(report.issues.len(), 2);
    }
}
