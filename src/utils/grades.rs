use anyhow::{anyhow, bail, Context};
use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use crate::models::GradeEntry;
use crate::utils::session::{extract_cdata, Session, GRADES_URL};

// Pulls every decimal number out of a line, in reading order:
// "QCM [17.00 /20.0(1.0) 20.00 /20.0(1.0) ](1.0)"
// => 17.00, 20.0, 1.0, 20.00, 20.0, 1.0, 1.0
// The separator is a literal decimal point; the portal never emits commas.
static GRADES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]+\.[0-9]+").unwrap());

// The top-most rows of the rendered tree table carry the depth-1 class.
static TOP_ROWS: Lazy<Selector> = Lazy::new(|| Selector::parse("tbody tr.ui-node-level-1").unwrap());
static ROWS: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").unwrap());
static CELLS: Lazy<Selector> = Lazy::new(|| Selector::parse("td").unwrap());
static SPANS: Lazy<Selector> = Lazy::new(|| Selector::parse("span").unwrap());

// Supplies the partial-update body listing a collapsed row's children.
// The live session posts to the portal; tests feed canned fragments instead.
pub trait RowSource {
    fn expand(&self, row_id: &str) -> Result<String>;
}

// Downloads the grades page and rebuilds the whole grade tree.
pub fn get_grades(session: &Session) -> Result<GradeEntry> {
    let page = session.get(GRADES_URL)?;
    let document = Html::parse_document(&page);
    materialize(&document, session)
}

// Processes the document's top-level rows and gathers them under a fresh root.
pub fn materialize(document: &Html, source: &dyn RowSource) -> Result<GradeEntry> {
    let mut children = Vec::new();
    for row in document.select(&TOP_ROWS) {
        if let Some(entry) = process_row(source, row)? {
            children.push(entry);
        }
    }
    Ok(GradeEntry::Aggregate {
        name: "Root".to_string(),
        coefficient: 1.0,
        children,
    })
}

// Turns one table row into a grade entry, fetching children on demand.
// Rows the portal renders without a coefficient are dropped with their
// whole subtree, before any request is sent for them.
fn process_row(source: &dyn RowSource, row: ElementRef) -> Result<Option<GradeEntry>> {
    let cells: Vec<ElementRef> = row.select(&CELLS).collect();
    let label_cell = *cells.first().ok_or_else(|| anyhow!("Row has no label cell"))?;

    let coefficient_text = cells.get(1)
        .map(|cell| cell.text().collect::<String>())
        .ok_or_else(|| anyhow!("Row {:?} has no coefficient cell", direct_text(label_cell)))?;
    let coefficient_text = coefficient_text.trim();
    if coefficient_text.is_empty() {
        return Ok(None);
    }

    let name = direct_text(label_cell);
    let coefficient: f64 = coefficient_text.parse()
        .with_context(|| format!("Row {:?} has an unreadable coefficient {:?}", name, coefficient_text))?;

    if let Some(fragment) = fetch_children(source, row, label_cell)? {
        // Folder row: recurse into the freshly rendered child rows, keeping
        // their order.
        let mut children = Vec::new();
        for child in fragment.select(&ROWS) {
            if let Some(entry) = process_row(source, child)? {
                children.push(entry);
            }
        }
        Ok(Some(GradeEntry::Aggregate { name, coefficient, children }))
    } else {
        // Subject row: the third cell holds the assessment lines, if any.
        let grades_text = cells.get(2)
            .map(|cell| cell.text().collect::<String>())
            .ok_or_else(|| anyhow!("Row {:?} has no grades cell", name))?;
        let children = if grades_text.trim().is_empty() {
            Vec::new()
        } else {
            parse_grade_lines(&grades_text)?
        };
        Ok(Some(GradeEntry::Aggregate { name, coefficient, children }))
    }
}

// A row is a folder when the last span of its label cell carries no inline
// style; on leaves the portal hides the toggler with one. Folders arrive
// collapsed, so their children have to be requested row by row.
fn fetch_children(source: &dyn RowSource, row: ElementRef, label_cell: ElementRef) -> Result<Option<Html>> {
    let marker = label_cell.select(&SPANS).last()
        .ok_or_else(|| anyhow!("Row {:?} has no marker span", direct_text(label_cell)))?;
    if marker.value().attr("style").map_or(false, |style| !style.is_empty()) {
        return Ok(None);
    }

    let row_id = row.value().attr("data-rk")
        .ok_or_else(|| anyhow!("Expandable row {:?} has no row id", direct_text(label_cell)))?;
    let body = source.expand(row_id)?;
    let rows = extract_cdata(&body)?;

    // The fragment is a run of bare <tr> siblings; the HTML5 tree builder
    // drops those unless they sit inside a table.
    Ok(Some(Html::parse_fragment(&format!("<table>{}</table>", rows))))
}

// Parses a subject's grade cell, one assessment per non-empty line:
//   QCM [17.00 /20.0(1.0) 20.00 /20.0(1.0) ](1.0)
// The last number on the line is the assessment's own coefficient; the rest
// group into (grade, max grade, coefficient) triples. An incomplete trailing
// triple is dropped rather than failing the row.
pub fn parse_grade_lines(text: &str) -> Result<Vec<GradeEntry>> {
    let mut assessments = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let name = line.split_once('[').map_or(line, |(head, _)| head).trim_end().to_string();
        let numbers = tokenize(line);
        let Some((coefficient, scores)) = numbers.split_last() else {
            bail!("Assessment line {:?} carries no numbers", line);
        };

        let mut children = Vec::new();
        for triple in scores.chunks_exact(3) {
            children.push(GradeEntry::Score {
                grade: triple[0],
                max_grade: triple[1],
                coefficient: triple[2],
            });
        }
        assessments.push(GradeEntry::Assessment {
            name,
            coefficient: *coefficient,
            children,
        });
    }
    Ok(assessments)
}

// Every decimal number in the line, left to right.
pub fn tokenize(line: &str) -> Vec<f64> {
    GRADES_RE.find_iter(line)
        .filter_map(|number| number.as_str().parse().ok())
        .collect()
}

// Text nodes sitting directly under the element, skipping nested markup.
fn direct_text(element: ElementRef) -> String {
    let mut text = String::new();
    for child in element.children() {
        if let Node::Text(fragment) = child.value() {
            text.push_str(&fragment.text);
        }
    }
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::{parse_grade_lines, tokenize};
    use crate::models::GradeEntry;

    #[test]
    fn tokenize_keeps_reading_order() {
        let line = "QCM [17.00 /20.0(1.0) 20.00 /20.0(1.0) 17.50 /20.0(1.0) ](1.0)";
        assert_eq!(
            tokenize(line),
            vec![17.00, 20.0, 1.0, 20.00, 20.0, 1.0, 17.50, 20.0, 1.0, 1.0]
        );
    }

    #[test]
    fn tokenize_wants_a_literal_decimal_point() {
        // Bare integers and comma decimals are not numbers to the portal.
        assert_eq!(tokenize("17 then 17,5 then 17.5"), vec![17.5]);
    }

    #[test]
    fn tokenize_of_garbage_is_empty() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("no numbers here []()").is_empty());
    }

    #[test]
    fn tokenize_round_trips_a_score_triple() {
        let rendered = format!("{:.2} /{:.1}({:.1})", 13.25, 20.0, 2.0);
        assert_eq!(tokenize(&rendered), vec![13.25, 20.0, 2.0]);
    }

    #[test]
    fn parses_a_full_assessment_line() {
        let text = "QCM [17.00 /20.0(1.0) 20.00 /20.0(1.0) 17.50 /20.0(1.0) ](1.0)";
        let parsed = parse_grade_lines(text).unwrap();
        assert_eq!(parsed, vec![GradeEntry::Assessment {
            name: "QCM".to_string(),
            coefficient: 1.0,
            children: vec![
                GradeEntry::Score { grade: 17.00, max_grade: 20.0, coefficient: 1.0 },
                GradeEntry::Score { grade: 20.00, max_grade: 20.0, coefficient: 1.0 },
                GradeEntry::Score { grade: 17.50, max_grade: 20.0, coefficient: 1.0 },
            ],
        }]);
    }

    #[test]
    fn parses_one_assessment_per_line_in_order() {
        let text = "Test [12.00 /20.0(2.0) ](2.0)\n\n  Oral [15.00 /20.0(1.0) ](1.0)  ";
        let parsed = parse_grade_lines(text).unwrap();
        assert_eq!(parsed.len(), 2);
        let names: Vec<_> = parsed.iter()
            .map(|entry| match entry {
                GradeEntry::Assessment { name, .. } => name.as_str(),
                _ => panic!("expected an assessment"),
            })
            .collect();
        assert_eq!(names, vec!["Test", "Oral"]);
    }

    #[test]
    fn truncates_an_incomplete_trailing_triple() {
        let text = "Oral [12.00 /20.0(1.0) 9.00 /10.0](2.0)";
        let parsed = parse_grade_lines(text).unwrap();
        match &parsed[0] {
            GradeEntry::Assessment { coefficient, children, .. } => {
                assert_eq!(*coefficient, 2.0);
                assert_eq!(children, &vec![
                    GradeEntry::Score { grade: 12.00, max_grade: 20.0, coefficient: 1.0 },
                ]);
            }
            other => panic!("expected an assessment, got {:?}", other),
        }
    }

    #[test]
    fn a_line_without_numbers_is_an_error() {
        assert!(parse_grade_lines("QCM [](?)").is_err());
    }

    #[test]
    fn empty_cell_text_yields_no_assessments() {
        assert!(parse_grade_lines("").unwrap().is_empty());
        assert!(parse_grade_lines("  \n  ").unwrap().is_empty());
    }
}
