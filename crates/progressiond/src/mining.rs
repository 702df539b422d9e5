//! Mining trigger: decides whether a broken block earns points.
//!
//! A block qualifies when its id contains one of the block patterns and the
//! tool in hand contains one of the tool patterns (both case-insensitive).

/// Eligibility rule for block-break grants
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MiningRule {
    points_per_block: u64,
    block_patterns: Vec<String>,
    tool_patterns: Vec<String>,
}

impl MiningRule {
    pub fn new(points_per_block: u64, block_patterns: &[String], tool_patterns: &[String]) -> Self {
        Self {
            points_per_block,
            block_patterns: lowercase_all(block_patterns),
            tool_patterns: lowercase_all(tool_patterns),
        }
    }

    /// Points earned for breaking `block_id` with `tool_id`, if any
    pub fn points_for(&self, block_id: &str, tool_id: Option<&str>) -> Option<u64> {
        if self.points_per_block == 0 {
            return None;
        }

        let tool = tool_id.map(str::trim).filter(|t| !t.is_empty())?;
        if !matches_any(block_id, &self.block_patterns) || !matches_any(tool, &self.tool_patterns) {
            return None;
        }
        Some(self.points_per_block)
    }
}

impl Default for MiningRule {
    fn default() -> Self {
        let config = crate::config::MiningConfig::default();
        Self::new(
            config.points_per_block,
            &config.block_patterns,
            &config.tool_patterns,
        )
    }
}

fn lowercase_all(patterns: &[String]) -> Vec<String> {
    patterns
        .iter()
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty())
        .collect()
}

fn matches_any(id: &str, patterns: &[String]) -> bool {
    let id = id.to_lowercase();
    patterns.iter().any(|p| id.contains(p.as_str()))
}
