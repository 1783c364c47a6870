//! Compliance Evaluator: classifies a repository
//! inventory against a set of templates and computes `RepositoryCompliance`.

use chrono::Utc;
use gitaudit_store::{ComplianceIssue, IssueType, RepositoryCompliance, Template};

use crate::inventory::RepositoryInventory;
use crate::version;

pub fn evaluate(repository: &str, inventory: &RepositoryInventory, templates: &[Template]) -> RepositoryCompliance {
    let mut issues = Vec::new();
    let mut applied_templates = Vec::new();
    let mut missing_templates = Vec::new();

    for template in templates {
        let template_issues = classify_template(template, inventory);

        let required_total = template.required_files.len() + template.required_directories.len();
        let missing_count = template_issues.iter().filter(|issue| issue.issue_type == IssueType::Missing).count();

        if missing_count == 0 {
            applied_templates.push(template.name.clone());
        }
        if required_total > 0 && missing_count == required_total {
            missing_templates.push(template.name.clone());
        }

        issues.extend(template_issues);
    }

    issues.sort_by(|a, b| {
        b.severity.cmp(&a.severity).then_with(|| a.template.cmp(&b.template)).then_with(|| a.file.cmp(&b.file))
    });

    let score = score_from_issues(&issues);
    let compliant = score >= 80;

    RepositoryCompliance {
        repository: repository.to_string(),
        applied_templates,
        missing_templates,
        issues,
        score,
        compliant,
    }
}

fn classify_template(template: &Template, inventory: &RepositoryInventory) -> Vec<ComplianceIssue> {
    let mut issues = Vec::new();
    let now = Utc::now();

    for path in &template.required_files {
        if let Some(issue_type) = classify_file(template, inventory, path) {
            issues.push(make_issue(issue_type, &template.name, path, now));
        }
    }

    for path in &template.required_directories {
        if !inventory.directories.contains(path) {
            issues.push(make_issue(IssueType::Missing, &template.name, path, now));
        }
    }

    issues
}

fn classify_file(template: &Template, inventory: &RepositoryInventory, path: &str) -> Option<IssueType> {
    let Some(file) = inventory.files.get(path) else {
        return Some(IssueType::Missing);
    };

    if let Some(expected_hash) = inventory.baseline_hashes.get(path) {
        if &file.hash != expected_hash {
            return Some(IssueType::Modified);
        }
    }
    if let Some(actual_version) = &file.version {
        if version::is_older(actual_version, &template.version) {
            return Some(IssueType::Outdated);
        }
    }
    if !file.syntax_valid {
        return Some(IssueType::Invalid);
    }
    None
}

fn make_issue(issue_type: IssueType, template: &str, file: &str, detected_at: chrono::DateTime<Utc>) -> ComplianceIssue {
    let severity = issue_type.default_severity();
    let (description, recommendation) = match issue_type {
        IssueType::Missing => (format!("{file} is required by {template} but was not found"), format!("add {file} to the repository")),
        IssueType::Outdated => (format!("{file} predates the version {template} requires"), format!("update {file} to the version {template} requires")),
        IssueType::Modified => (format!("{file} content diverges from the {template} baseline"), format!("restore {file} to the {template} baseline or re-apply the template")),
        IssueType::Invalid => (format!("{file} failed its syntax check"), format!("fix the syntax errors in {file}")),
    };
    ComplianceIssue { issue_type, severity, template: template.to_string(), file: file.to_string(), description, recommendation, detected_at }
}

fn score_from_issues(issues: &[ComplianceIssue]) -> u32 {
    if issues.is_empty() {
        return 100;
    }
    let total_weight: f64 = issues.iter().map(|issue| issue.severity.weight()).sum();
    let penalty = (total_weight / issues.len() as f64) * 100.0;
    (100.0 - penalty).max(0.0).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::RepositoryFile;
    use gitaudit_store::ScoringWeights;
    use uuid::Uuid;

    fn template(name: &str, files: &[&str]) -> Template {
        Template {
            id: Uuid::new_v4(),
            name: name.to_string(),
            version: "1.0.0".to_string(),
            template_type: "base".to_string(),
            required_files: files.iter().map(|s| s.to_string()).collect(),
            required_directories: vec![],
            scoring_weights: ScoringWeights { files: 1.0, directories: 0.0, content: 0.0 },
        }
    }

    #[test]
    fn no_issues_scores_100_and_is_compliant() {
        let inventory = RepositoryInventory::new().with_file(
            "README.md",
            RepositoryFile { hash: "abc".to_string(), version: None, syntax_valid: true },
        );
        let result = evaluate("r", &inventory, &[template("base", &["README.md"])]);
        assert_eq!(result.score, 100);
        assert!(result.compliant);
        assert_eq!(result.applied_templates, vec!["base".to_string()]);
        assert!(result.missing_templates.is_empty());
    }

    #[test]
    fn two_issues_high_and_low_score_35() {
        let mut inventory = RepositoryInventory::new();
        inventory.files.insert("invalid.yaml".to_string(), RepositoryFile { hash: "x".to_string(), version: None, syntax_valid: false });
        // "missing.yaml" absent entirely -> Missing (High)
        let result = evaluate("r", &inventory, &[template("base", &["missing.yaml", "invalid.yaml"])]);

        assert_eq!(result.score, 35);
        assert!(!result.compliant);
        assert_eq!(result.issues.len(), 2);
        assert_eq!(result.issues[0].severity, gitaudit_store::Severity::High);
        assert_eq!(result.issues[1].severity, gitaudit_store::Severity::Low);
    }

    #[test]
    fn template_with_all_files_missing_is_reported_missing() {
        let inventory = RepositoryInventory::new();
        let result = evaluate("r", &inventory, &[template("base", &["a.yaml", "b.yaml"])]);
        assert_eq!(result.missing_templates, vec!["base".to_string()]);
        assert!(result.applied_templates.is_empty());
    }

    #[test]
    fn issues_are_ordered_by_severity_then_template_then_file() {
        let inventory = RepositoryInventory::new();
        let templates = vec![template("z-template", &["a.yaml"]), template("a-template", &["b.yaml", "a.yaml"])];
        let result = evaluate("r", &inventory, &templates);
        let keys: Vec<(String, String)> = result.issues.iter().map(|i| (i.template.clone(), i.file.clone())).collect();
        assert_eq!(
            keys,
            vec![
                ("a-template".to_string(), "a.yaml".to_string()),
                ("a-template".to_string(), "b.yaml".to_string()),
                ("z-template".to_string(), "a.yaml".to_string()),
            ]
        );
    }
}
