//! Context aggregation: what flows into a chat block.
//!
//! Given a target block, every block with an edge pointing at it contributes
//! one formatted segment (one hop only, no transitive traversal):
//!
//! ```text
//! [TEXT: Text Block]
//! [Use as: background]     ← only when instruction_prompt is set
//! Hello
//! ```
//!
//! Segments are joined with the configured separator in edge creation order.
//! Image blocks contribute a placeholder body and push their resource URL to
//! `image_urls` instead; the URL never appears in `text_context`. Group blocks
//! are expanded into their members' segments.
//!
//! Aggregation is a pure function of `(target, blocks, edges)` and holds no
//! cache. Callers re-run it after any structural or content change.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use trellis_types::{Block, BlockId, BlockKind, Edge};

use crate::config::DEFAULT_CONTEXT_SEPARATOR;
use crate::graph::BoardGraph;

/// Body text used for image blocks in place of their content.
pub const IMAGE_PLACEHOLDER: &str = "reference image provided for visual context";

/// Prompt-ready payload for one target block.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedContext {
    pub text_context: String,
    /// Image references in segment order.
    pub image_urls: Vec<String>,
}

impl AggregatedContext {
    pub fn is_empty(&self) -> bool {
        self.text_context.is_empty() && self.image_urls.is_empty()
    }
}

/// What a single source block contributes.
enum Segment<'a> {
    /// Nothing (empty content).
    Skip,
    Text { header: String, body: &'a str },
    Image { header: String, url: Option<&'a str> },
    /// Expand into these members instead.
    Expand(Vec<BlockId>),
}

/// Per-kind formatting table.
fn segment_for(block: &Block) -> Segment<'_> {
    match block.kind {
        BlockKind::Group => Segment::Expand(block.group_members()),
        BlockKind::Image => Segment::Image {
            header: header(block, &block.title),
            url: block.resource_url(),
        },
        BlockKind::Url => {
            if block.content.is_empty() {
                return Segment::Skip;
            }
            let name = block.url.as_deref().filter(|u| !u.is_empty()).unwrap_or(&block.title);
            Segment::Text {
                header: header(block, name),
                body: &block.content,
            }
        }
        BlockKind::Text
        | BlockKind::Document
        | BlockKind::Video
        | BlockKind::Chat
        | BlockKind::Brain
        | BlockKind::Creative => {
            if block.content.is_empty() {
                return Segment::Skip;
            }
            Segment::Text {
                header: header(block, &block.title),
                body: &block.content,
            }
        }
    }
}

fn header(block: &Block, name: &str) -> String {
    let mut header = format!("[{}: {}]", block.kind.context_label(), name);
    if let Some(prompt) = block.instruction() {
        header.push_str(&format!("\n[Use as: {prompt}]"));
    }
    header
}

/// Context aggregator with a configurable segment separator.
#[derive(Clone, Debug)]
pub struct ContextAggregator {
    separator: String,
}

impl Default for ContextAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_CONTEXT_SEPARATOR)
    }
}

impl ContextAggregator {
    pub fn new(separator: impl Into<String>) -> Self {
        Self {
            separator: separator.into(),
        }
    }

    /// Aggregate against a live graph.
    pub fn aggregate_graph(&self, target: BlockId, graph: &BoardGraph) -> AggregatedContext {
        self.aggregate_with(target, |id| graph.block(id), graph.edges())
    }

    /// Aggregate against plain block and edge slices (e.g. a snapshot).
    pub fn aggregate(&self, target: BlockId, blocks: &[Block], edges: &[Edge]) -> AggregatedContext {
        let index: HashMap<BlockId, &Block> = blocks.iter().map(|b| (b.id, b)).collect();
        self.aggregate_with(target, |id| index.get(&id).copied(), edges)
    }

    fn aggregate_with<'a>(
        &self,
        target: BlockId,
        lookup: impl Fn(BlockId) -> Option<&'a Block>,
        edges: &[Edge],
    ) -> AggregatedContext {
        let mut out = Collector::default();
        // The target never feeds itself, even through a group it belongs to.
        let mut visited = HashSet::from([target]);

        for edge in edges.iter().filter(|e| e.target == target) {
            self.visit(edge.source, &lookup, &mut visited, &mut out);
        }

        AggregatedContext {
            text_context: out.segments.join(&self.separator),
            image_urls: out.image_urls,
        }
    }

    /// Emit one block's segment, expanding groups depth-first. Each block
    /// contributes at most once per aggregation.
    fn visit<'a>(
        &self,
        id: BlockId,
        lookup: &impl Fn(BlockId) -> Option<&'a Block>,
        visited: &mut HashSet<BlockId>,
        out: &mut Collector,
    ) {
        if !visited.insert(id) {
            return;
        }
        let Some(block) = lookup(id) else {
            tracing::debug!(block = %id, "skipping missing context source");
            return;
        };
        match segment_for(block) {
            Segment::Skip => {}
            Segment::Text { header, body } => out.segments.push(format!("{header}\n{body}")),
            Segment::Image { header, url } => {
                out.segments.push(format!("{header}\n{IMAGE_PLACEHOLDER}"));
                if let Some(url) = url {
                    out.image_urls.push(url.to_string());
                }
            }
            Segment::Expand(members) => {
                for member in members {
                    self.visit(member, lookup, visited, out);
                }
            }
        }
    }
}

#[derive(Default)]
struct Collector {
    segments: Vec<String>,
    image_urls: Vec<String>,
}

/// Aggregate with the default separator.
pub fn aggregate(target: BlockId, blocks: &[Block], edges: &[Edge]) -> AggregatedContext {
    ContextAggregator::default().aggregate(target, blocks, edges)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use trellis_types::{BlockOverrides, BoardId, CanvasPoint, create_block, create_edge};

    struct Fixture {
        blocks: Vec<Block>,
        edges: Vec<Edge>,
    }

    impl Fixture {
        fn new() -> Self {
            Self { blocks: Vec::new(), edges: Vec::new() }
        }

        fn add(&mut self, kind: BlockKind, overrides: BlockOverrides) -> BlockId {
            let block = create_block(kind, CanvasPoint::default(), overrides);
            let id = block.id;
            self.blocks.push(block);
            id
        }

        fn connect(&mut self, source: BlockId, target: BlockId) {
            let edge = create_edge(BoardId::nil(), source, target, &self.edges).unwrap();
            self.edges.push(edge);
        }

        fn aggregate(&self, target: BlockId) -> AggregatedContext {
            aggregate(target, &self.blocks, &self.edges)
        }
    }

    #[test]
    fn test_text_block_into_chat() {
        let mut fx = Fixture::new();
        let a = fx.add(BlockKind::Text, BlockOverrides::new().content("Hello"));
        let chat = fx.add(BlockKind::Chat, BlockOverrides::new());
        fx.connect(a, chat);

        let ctx = fx.aggregate(chat);
        assert_eq!(ctx.text_context, "[TEXT: Text Block]\nHello");
        assert!(ctx.image_urls.is_empty());
    }

    #[test]
    fn test_no_incoming_edges_is_empty() {
        let mut fx = Fixture::new();
        let chat = fx.add(BlockKind::Chat, BlockOverrides::new());
        let ctx = fx.aggregate(chat);
        assert_eq!(ctx, AggregatedContext::default());
        assert!(ctx.is_empty());

        // Unknown target is not an error either.
        assert!(fx.aggregate(BlockId::new()).is_empty());
    }

    #[test]
    fn test_image_url_is_separated() {
        let mut fx = Fixture::new();
        let img = fx.add(BlockKind::Image, BlockOverrides::new().file_url("http://x/y.png"));
        let chat = fx.add(BlockKind::Chat, BlockOverrides::new());
        fx.connect(img, chat);

        let ctx = fx.aggregate(chat);
        assert_eq!(ctx.image_urls, vec!["http://x/y.png".to_string()]);
        assert!(!ctx.text_context.contains("http://x/y.png"));
        assert_eq!(ctx.text_context, format!("[IMAGE: Image]\n{IMAGE_PLACEHOLDER}"));
    }

    #[test]
    fn test_segments_joined_in_edge_creation_order() {
        let mut fx = Fixture::new();
        let first = fx.add(BlockKind::Text, BlockOverrides::new().title("First").content("one"));
        let second = fx.add(BlockKind::Document, BlockOverrides::new().title("Notes").content("two"));
        let chat = fx.add(BlockKind::Chat, BlockOverrides::new());
        // Connect the later block first.
        fx.connect(second, chat);
        fx.connect(first, chat);

        assert_eq!(
            fx.aggregate(chat).text_context,
            "[DOCUMENT: Notes]\ntwo\n\n---\n\n[TEXT: First]\none"
        );
    }

    #[test]
    fn test_empty_content_is_skipped() {
        let mut fx = Fixture::new();
        let empty = fx.add(BlockKind::Text, BlockOverrides::new());
        let full = fx.add(BlockKind::Brain, BlockOverrides::new().content("facts"));
        let chat = fx.add(BlockKind::Chat, BlockOverrides::new());
        fx.connect(empty, chat);
        fx.connect(full, chat);

        assert_eq!(fx.aggregate(chat).text_context, "[BRAIN: Knowledge]\nfacts");
    }

    #[test]
    fn test_instruction_prompt_follows_label() {
        let mut fx = Fixture::new();
        let a = fx.add(
            BlockKind::Text,
            BlockOverrides::new().content("Be brief.").instruction_prompt("tone guide"),
        );
        let chat = fx.add(BlockKind::Chat, BlockOverrides::new());
        fx.connect(a, chat);

        assert_eq!(
            fx.aggregate(chat).text_context,
            "[TEXT: Text Block]\n[Use as: tone guide]\nBe brief."
        );
    }

    #[test]
    fn test_url_label_prefers_url_field() {
        let mut fx = Fixture::new();
        let with_url = fx.add(
            BlockKind::Url,
            BlockOverrides::new().url("https://example.com").content("page text"),
        );
        let without_url = fx.add(BlockKind::Url, BlockOverrides::new().title("Saved").content("other"));
        let chat = fx.add(BlockKind::Chat, BlockOverrides::new());
        fx.connect(with_url, chat);
        fx.connect(without_url, chat);

        assert_eq!(
            fx.aggregate(chat).text_context,
            "[URL: https://example.com]\npage text\n\n---\n\n[URL: Saved]\nother"
        );
    }

    #[test]
    fn test_group_expands_to_members() {
        let mut fx = Fixture::new();
        let a = fx.add(BlockKind::Text, BlockOverrides::new().title("A").content("alpha"));
        let img = fx.add(BlockKind::Image, BlockOverrides::new().url("http://img"));
        let group = fx.add(BlockKind::Group, BlockOverrides::new());
        fx.blocks
            .iter_mut()
            .find(|b| b.id == group)
            .unwrap()
            .set_group_members(&[a, img, BlockId::new()]);
        let chat = fx.add(BlockKind::Chat, BlockOverrides::new());
        fx.connect(group, chat);

        let ctx = fx.aggregate(chat);
        assert_eq!(
            ctx.text_context,
            format!("[TEXT: A]\nalpha\n\n---\n\n[IMAGE: Image]\n{IMAGE_PLACEHOLDER}")
        );
        assert_eq!(ctx.image_urls, vec!["http://img".to_string()]);
    }

    #[test]
    fn test_empty_group_contributes_nothing() {
        let mut fx = Fixture::new();
        let group = fx.add(BlockKind::Group, BlockOverrides::new());
        let chat = fx.add(BlockKind::Chat, BlockOverrides::new());
        fx.connect(group, chat);
        assert!(fx.aggregate(chat).is_empty());
    }

    #[test]
    fn test_nested_groups_terminate() {
        let mut fx = Fixture::new();
        let a = fx.add(BlockKind::Text, BlockOverrides::new().content("x"));
        let outer = fx.add(BlockKind::Group, BlockOverrides::new());
        let inner = fx.add(BlockKind::Group, BlockOverrides::new());
        for block in fx.blocks.iter_mut() {
            if block.id == outer {
                block.set_group_members(&[inner, a]);
            } else if block.id == inner {
                block.set_group_members(&[outer, a]);
            }
        }
        let chat = fx.add(BlockKind::Chat, BlockOverrides::new());
        fx.connect(outer, chat);

        assert_eq!(fx.aggregate(chat).text_context, "[TEXT: Text Block]\nx");
    }

    #[test]
    fn test_transitive_sources_are_ignored() {
        let mut fx = Fixture::new();
        let far = fx.add(BlockKind::Text, BlockOverrides::new().content("far"));
        let near = fx.add(BlockKind::Text, BlockOverrides::new().content("near"));
        let chat = fx.add(BlockKind::Chat, BlockOverrides::new());
        fx.connect(far, near);
        fx.connect(near, chat);

        assert_eq!(fx.aggregate(chat).text_context, "[TEXT: Text Block]\nnear");
    }

    #[test]
    fn test_aggregate_is_deterministic_and_matches_graph_form() {
        let mut fx = Fixture::new();
        let a = fx.add(BlockKind::Text, BlockOverrides::new().content("a"));
        let img = fx.add(BlockKind::Image, BlockOverrides::new().file_url("f"));
        let chat = fx.add(BlockKind::Chat, BlockOverrides::new());
        fx.connect(a, chat);
        fx.connect(img, chat);

        let first = fx.aggregate(chat);
        assert_eq!(first, fx.aggregate(chat));

        let graph = BoardGraph::from_snapshot(trellis_types::GraphSnapshot::new(
            fx.blocks.clone(),
            fx.edges.clone(),
        ));
        assert_eq!(ContextAggregator::default().aggregate_graph(chat, &graph), first);
    }

    #[test]
    fn test_custom_separator() {
        let mut fx = Fixture::new();
        let a = fx.add(BlockKind::Text, BlockOverrides::new().content("a"));
        let b = fx.add(BlockKind::Text, BlockOverrides::new().content("b"));
        let chat = fx.add(BlockKind::Chat, BlockOverrides::new());
        fx.connect(a, chat);
        fx.connect(b, chat);

        let ctx = ContextAggregator::new(" | ").aggregate(chat, &fx.blocks, &fx.edges);
        assert_eq!(ctx.text_context, "[TEXT: Text Block]\na | [TEXT: Text Block]\nb");
    }
}
