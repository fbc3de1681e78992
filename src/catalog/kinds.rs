//! Closed vocabularies of the ontology.
//!
//! Ranked vocabularies are declared best-first; listing order relies on it.

string_enum! {
    /// Every table a polymorphic reference may point into.
    pub enum EntityKind ("entity kind") {
        Concept => "concept",
        Framework => "framework",
        FrameworkElement => "framework_element",
        Tension => "tension",
        Evidence => "evidence",
        Source => "source",
        Actor => "actor",
        ArchitectureElement => "architecture_element",
        Proposal => "proposal",
    }
}

impl EntityKind {
    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::Concept => "concepts",
            EntityKind::Framework => "frameworks",
            EntityKind::FrameworkElement => "framework_elements",
            EntityKind::Tension => "tensions",
            EntityKind::Evidence => "evidence",
            EntityKind::Source => "intellectual_sources",
            EntityKind::Actor => "actor_types",
            EntityKind::ArchitectureElement => "architecture_elements",
            EntityKind::Proposal => "proposals",
        }
    }

    /// Upper bound applied to a requested page size.
    pub fn max_page_size(&self) -> usize {
        match self {
            EntityKind::Concept => 200,
            _ => 100,
        }
    }
}

string_enum! {
    pub enum ConceptType ("concept type") {
        Phenomenon => "phenomenon",
        Mechanism => "mechanism",
        Proposal => "proposal",
        Critique => "critique",
        Synthesis => "synthesis",
    }
}

string_enum! {
    pub enum Maturity ("maturity") {
        Canonical => "canonical",
        Established => "established",
        Developing => "developing",
        Embryonic => "embryonic",
    }
}

string_enum! {
    pub enum Confidence ("confidence") {
        Consensus => "consensus",
        Supported => "supported",
        Contested => "contested",
        Speculative => "speculative",
    }
}

string_enum! {
    pub enum Severity ("severity") {
        Fundamental => "fundamental",
        Significant => "significant",
        Minor => "minor",
    }
}

string_enum! {
    pub enum ResolutionStatus ("resolution status") {
        Unresolved => "unresolved",
        PartiallyAddressed => "partially_addressed",
        Resolved => "resolved",
    }
}

string_enum! {
    /// Evidence strength, strongest first.
    pub enum EvidenceQuality ("evidence quality") {
        Consensus => "consensus",
        MetaAnalysis => "meta_analysis",
        Longitudinal => "longitudinal",
        Pilot => "pilot",
        Anecdotal => "anecdotal",
    }
}

string_enum! {
    pub enum LinkType ("evidence link type") {
        Supports => "supports",
        Challenges => "challenges",
        Illustrates => "illustrates",
    }
}

string_enum! {
    pub enum ProposalStatus ("proposal status") {
        Draft => "draft",
        Active => "active",
        Accepted => "accepted",
        Rejected => "rejected",
        Withdrawn => "withdrawn",
    }
}

string_enum! {
    /// Soft-disable flag for curated entities.
    pub enum EntityStatus ("status") {
        Active => "active",
        Deprecated => "deprecated",
    }
}

impl Default for EntityStatus {
    fn default() -> Self {
        EntityStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_prints_text_forms() {
        assert_eq!("meta_analysis".parse::<EvidenceQuality>().unwrap(), EvidenceQuality::MetaAnalysis);
        assert_eq!(ResolutionStatus::PartiallyAddressed.to_string(), "partially_addressed");
        assert_eq!(
            "bogus".parse::<Severity>().unwrap_err(),
            "invalid severity: 'bogus'"
        );
    }

    #[test]
    fn quality_rank_orders_strongest_first() {
        assert!(EvidenceQuality::Consensus.rank() < EvidenceQuality::MetaAnalysis.rank());
        assert!(EvidenceQuality::Pilot.rank() < EvidenceQuality::Anecdotal.rank());
        assert!(Maturity::Canonical.rank() < Maturity::Embryonic.rank());
    }

    #[test]
    fn order_case_covers_every_value() {
        let sql = Maturity::order_case("maturity");
        assert_eq!(
            sql,
            "CASE maturity WHEN 'canonical' THEN 0 WHEN 'established' THEN 1 \
             WHEN 'developing' THEN 2 WHEN 'embryonic' THEN 3 ELSE 4 END"
        );
    }

    #[test]
    fn serde_uses_text_forms() {
        let json = serde_json::to_string(&EntityKind::FrameworkElement).unwrap();
        assert_eq!(json, "\"framework_element\"");
        assert_eq!(EntityKind::Concept.max_page_size(), 200);
        assert_eq!(EntityKind::Evidence.max_page_size(), 100);
    }
}
