//! JUnit XML output so CI systems can show symbol checks as test cases.

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::path::Path;

use crate::analyzer::Severity;
use crate::core::{severity_label, CheckSummary, KlcError, SymbolReport};

const SUITE_NAME: &str = "Symbol KLC Checks";
const SUITE_ID: &str = "klc-sym";

#[derive(Debug, Clone, PartialEq)]
struct Failure {
    message: String,
    text: String,
}

#[derive(Debug, Clone)]
struct TestCase {
    name: String,
    kind: Option<&'static str>,
    failures: Vec<Failure>,
}

/// One test case per clean symbol and one per severity for the others.
#[derive(Debug, Clone)]
pub struct JunitReport {
    cases: Vec<TestCase>,
    timestamp: DateTime<Utc>,
}

impl JunitReport {
    pub fn from_summary(summary: &CheckSummary) -> Self {
        let mut report = Self {
            cases: Vec::new(),
            timestamp: Utc::now(),
        };
        for symbol in summary.symbols() {
            report.add_symbol(symbol);
        }
        report
    }

    fn add_symbol(&mut self, symbol: &SymbolReport) {
        let full_name = symbol.full_name();
        let mut buckets: Vec<(&'static str, Vec<Failure>)> = Vec::new();
        let mut push = |kind: &'static str, failure: Failure| {
            let idx = match buckets.iter().position(|(k, _)| *k == kind) {
                Some(idx) => idx,
                None => {
                    buckets.push((kind, Vec::new()));
                    buckets.len() - 1
                }
            };
            let failures = &mut buckets[idx].1;
            if !failures.contains(&failure) {
                failures.push(failure);
            }
        };

        for rule in &symbol.rules {
            if rule.exception.is_some() {
                let message = rule.headline(&symbol.library, &symbol.name);
                push(
                    severity_label(Severity::Info),
                    Failure {
                        text: message.clone(),
                        message,
                    },
                );
            }
            for entry in &rule.entries {
                let mut text = entry.message.clone();
                if !entry.extras.is_empty() {
                    text.push('\n');
                    text.push_str(&entry.extras.join("\n    "));
                }
                push(
                    severity_label(entry.severity),
                    Failure {
                        message: entry.message.clone(),
                        text,
                    },
                );
            }
        }

        if buckets.is_empty() {
            self.cases.push(TestCase {
                name: full_name,
                kind: None,
                failures: Vec::new(),
            });
            return;
        }
        for (kind, failures) in buckets {
            self.cases.push(TestCase {
                name: format!("{} - {}", full_name, kind),
                kind: Some(kind),
                failures,
            });
        }
    }

    pub fn tests(&self) -> usize {
        self.cases.len()
    }

    pub fn failures(&self) -> usize {
        self.cases.iter().filter(|c| !c.failures.is_empty()).count()
    }

    pub fn to_xml(&self) -> Result<String, KlcError> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        writer.write_event(Event::Start(BytesStart::new("testsuites")))?;

        let tests = self.tests().to_string();
        let failures = self.failures().to_string();
        let mut suite = BytesStart::new("testsuite");
        suite.push_attribute(("name", SUITE_NAME));
        suite.push_attribute(("id", SUITE_ID));
        suite.push_attribute(("tests", tests.as_str()));
        suite.push_attribute(("failures", failures.as_str()));
        let timestamp = self.timestamp.format("%Y-%m-%dT%H:%M:%S").to_string();
        suite.push_attribute(("timestamp", timestamp.as_str()));
        writer.write_event(Event::Start(suite))?;

        for case in &self.cases {
            let mut start = BytesStart::new("testcase");
            start.push_attribute(("classname", SUITE_NAME));
            start.push_attribute(("name", case.name.as_str()));
            if let Some(kind) = case.kind {
                start.push_attribute(("type", kind));
            }
            if case.failures.is_empty() {
                writer.write_event(Event::Empty(start))?;
                continue;
            }
            writer.write_event(Event::Start(start))?;
            for failure in &case.failures {
                let mut element = BytesStart::new("failure");
                element.push_attribute(("message", failure.message.as_str()));
                writer.write_event(Event::Start(element))?;
                writer.write_event(Event::Text(BytesText::new(&failure.text)))?;
                writer.write_event(Event::End(BytesEnd::new("failure")))?;
            }
            writer.write_event(Event::End(BytesEnd::new("testcase")))?;
        }

        writer.write_event(Event::End(BytesEnd::new("testsuite")))?;
        writer.write_event(Event::End(BytesEnd::new("testsuites")))?;
        let mut xml =
            String::from_utf8(writer.into_inner()).map_err(|e| KlcError::Report(e.to_string()))?;
        xml.push('\n');
        Ok(xml)
    }

    /// Write the report, replacing any existing file.
    pub fn write(&self, path: &Path) -> Result<(), KlcError> {
        std::fs::write(path, self.to_xml()?)?;
        tracing::debug!("Wrote JUnit report {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::LogEntry;
    use crate::core::{LibraryReport, RuleReport};

    fn symbol(name: &str, rules: Vec<RuleReport>) -> SymbolReport {
        SymbolReport {
            library: "Device".to_string(),
            name: name.to_string(),
            rules,
            errors: 0,
            warnings: 0,
            fixed: false,
            unittest: None,
        }
    }

    fn rule(entries: Vec<LogEntry>) -> RuleReport {
        RuleReport {
            rule_id: "S4.1".to_string(),
            description: "Pin requirements".to_string(),
            url: "https://klc.kicad.org/symbol/s4/s4.1/".to_string(),
            errors: 1,
            warnings: 0,
            exception: None,
            entries,
        }
    }

    fn entry(severity: Severity, message: &str, extras: &[&str]) -> LogEntry {
        LogEntry {
            severity,
            message: message.to_string(),
            extras: extras.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn summary() -> CheckSummary {
        let mut lib = LibraryReport::failed(Path::new("Device.kicad_sym"), "");
        lib.symbols.push(symbol("R", vec![]));
        lib.symbols.push(symbol(
            "C",
            vec![rule(vec![
                entry(Severity::Error, "Pins not located on 100mil (=2.54mm) grid:", &[" - pin A", " - pin B"]),
                entry(Severity::Error, "Pins not located on 100mil (=2.54mm) grid:", &[" - pin A", " - pin B"]),
                entry(Severity::Warning, "Pin length <& odd", &[]),
            ])],
        ));
        let mut summary = CheckSummary::default();
        summary.push(lib);
        summary
    }

    #[test]
    fn test_cases_per_severity() {
        let report = JunitReport::from_summary(&summary());
        assert_eq!(report.tests(), 3);
        assert_eq!(report.failures(), 2);
        assert_eq!(report.cases[1].name, "Device:C - Errors");
        assert_eq!(report.cases[1].failures.len(), 1);
        assert_eq!(report.cases[1].failures[0].text, "Pins not located on 100mil (=2.54mm) grid:\n - pin A\n     - pin B");
    }

    #[test]
    fn test_xml_output() {
        let xml = JunitReport::from_summary(&summary()).to_xml().unwrap();
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("<testsuite name=\"Symbol KLC Checks\" id=\"klc-sym\" tests=\"3\" failures=\"2\" timestamp=\""));
        assert!(xml.contains("<testcase classname=\"Symbol KLC Checks\" name=\"Device:R\"/>"));
        assert!(xml.contains("type=\"Warnings\""));
        assert!(xml.contains("Pin length &lt;&amp; odd"));
    }
}
