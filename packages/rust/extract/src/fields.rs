//! Pattern-based field extraction.
//!
//! Each field has an ordered list of patterns; the first capture wins.

use std::sync::LazyLock;

use regex::Regex;

use tenderwatch_shared::ExtractedFields;

/// Field values longer than this are cut.
const MAX_FIELD_CHARS: usize = 120;

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("valid regex"))
        .collect()
}

static LOCATION: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?:项目地点|建设地点|工程地点|施工地点|项目地址|交货地点|地点)\s*[：:]\s*([^\n；;。]+)",
        r"位于([^\n，,；;。]+)",
    ])
});

static SCOPE: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?:招标范围|工程范围|施工范围|建设内容|项目内容|工程内容|建设规模|工程概况|项目概况)\s*[：:]\s*([^\n]+)",
    ])
});

static DEADLINE: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?:投标截止时间|投标截止日期|递交投标文件截止时间|响应文件递交截止时间|报名截止时间|截止时间|开标时间)\s*[：:为]?\s*([^\n；;]+)",
        r"(\d{4}\s*[-/年]\s*\d{1,2}\s*[-/月]\s*\d{1,2}\s*日?[^\n；;]*?(?:之前|前))",
    ])
});

static TONNAGE: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?:用钢量|钢结构工程量|钢材用量|钢结构总量|总重|吨位)\s*[：:约为]*\s*(\d+(?:\.\d+)?\s*(?:吨|t|T))",
        r"(约\s*\d+(?:\.\d+)?\s*(?:吨|t|T))",
        r"(\d+(?:\.\d+)?\s*吨)",
    ])
});

static QUALIFICATION: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?:投标人资格要求|资质要求|资格要求|资质条件|资质)\s*[：:]\s*([^\n]+)",
        r"(具[备有][^\n。；;]*?资质)",
    ])
});

/// Pull location, scope, deadline, tonnage and qualification out of normalized text.
pub fn extract_fields(text: &str) -> ExtractedFields {
    ExtractedFields {
        location: first_match(&LOCATION, text),
        scope: first_match(&SCOPE, text),
        deadline: first_match(&DEADLINE, text),
        tonnage: first_match(&TONNAGE, text),
        qualification: first_match(&QUALIFICATION, text),
    }
}

fn first_match(patterns: &[Regex], text: &str) -> String {
    patterns
        .iter()
        .filter_map(|re| re.captures(text))
        .filter_map(|caps| caps.get(1).map(|m| tidy(m.as_str())))
        .find(|value| !value.is_empty())
        .unwrap_or_default()
}

fn tidy(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches(['。', '，', ',', '；', ';', '：', ':', ' ']);
    trimmed.chars().take(MAX_FIELD_CHARS).collect()
}
