use super::*;
use crate::loader::RawDocument;

fn lorem(words: usize) -> String {
    (0..words)
        .map(|i| format!("word{}", i % 17))
        .collect::<Vec<_>>()
        .join(" ")
}

#[test]
fn short_text_is_single_chunk() {
    let pieces = split_text("A short note.", 500, 100);
    assert_eq!(pieces.len(), 1);
    assert_eq!(pieces[0].0, "A short note.");
    assert_eq!(pieces[0].1, "");
}

#[test]
fn blank_text_produces_nothing() {
    assert!(split_text("", 50, 10).is_empty());
    assert!(split_text("  \n\n  ", 50, 10).is_empty());
}

#[test]
fn chunks_respect_size_and_overlap() {
    let text = lorem(400);
    let pieces = split_text(&text, 120, 30);

    assert!(pieces.len() > 1);
    for (content, _) in &pieces {
        assert!(content.chars().count() <= 120);
    }
    for pair in pieces.windows(2) {
        let (previous, _) = &pair[0];
        let (current, shared) = &pair[1];
        assert_eq!(shared.chars().count(), 30);
        assert!(current.starts_with(shared.as_str()));
        assert!(previous.ends_with(shared.as_str()));
    }
}

#[test]
fn chunks_cover_whole_text() {
    let text = lorem(250);
    let pieces = split_text(&text, 100, 20);

    let mut rebuilt = String::new();
    for (content, shared) in &pieces {
        rebuilt.push_str(&content[shared.len()..]);
    }
    assert_eq!(rebuilt, text);
}

#[test]
fn prefers_paragraph_boundaries() {
    let first = "a".repeat(60);
    let second = "b".repeat(60);
    let text = format!("{}\n\n{}", first, second);

    let pieces = split_text(&text, 100, 10);
    assert!(pieces[0].0.ends_with("\n\n"));
    assert_eq!(pieces[0].0.trim_end(), first);
}

#[test]
fn hard_cut_without_separators() {
    let text = "x".repeat(250);
    let pieces = split_text(&text, 100, 25);

    assert_eq!(pieces[0].0.len(), 100);
    assert_eq!(pieces[1].1.len(), 25);
    assert!(pieces.iter().all(|(content, _)| content.len() <= 100));
}

#[test]
fn multibyte_text_is_split_on_char_boundaries() {
    let text = "é".repeat(90);
    let pieces = split_text(&text, 40, 10);

    assert!(pieces.len() > 2);
    for (content, shared) in &pieces {
        assert!(content.chars().count() <= 40);
        assert!(content.chars().all(|c| c == 'é'));
        assert!(shared.chars().count() == 10 || shared.is_empty());
    }
}

#[test]
fn split_is_deterministic() {
    let mut research = RawDocument::new("data/research.txt", lorem(300));
    research.metadata.category = Some("research".to_string());
    research.metadata.document_id = Some(3);
    let documents = vec![research, RawDocument::new("data/general.txt", lorem(80))];
    let config = ChunkingConfig {
        chunk_size: 90,
        chunk_overlap: 15,
    };

    let first = split_documents(&documents, &config);
    let second = split_documents(&documents, &config);
    assert_eq!(first, second);
}

#[test]
fn chunks_keep_source_attribution() {
    let mut document = RawDocument::new("data/paper.pdf", lorem(200)).with_page(4);
    document.metadata.category = Some("research".to_string());
    document.metadata.document_id = Some(11);

    let chunks = split_documents(&[document], &ChunkingConfig::default());
    assert!(chunks.len() > 1);
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.source_path, "data/paper.pdf");
        assert_eq!(chunk.page, Some(4));
        assert_eq!(chunk.document_id, Some(11));
        assert_eq!(chunk.category.as_deref(), Some("research"));
        assert_eq!(chunk.chunk_index, i);
    }
    assert!(chunks[0].overlap_with_predecessor.is_empty());
}

#[test]
fn whitespace_only_chunks_are_dropped() {
    let text = format!("Intro line.{}", " ".repeat(1200));
    let document = RawDocument::new("a.txt", text);

    let chunks = split_documents(&[document], &ChunkingConfig::default());

    assert_eq!(chunks.len(), 1);
    assert!(chunks[0].content.starts_with("Intro line."));
    assert_eq!(chunks[0].chunk_index, 0);
}

#[test]
fn chunk_indices_stay_dense_around_blank_runs() {
    let text = format!("alpha{}omega", " ".repeat(1500));
    let document = RawDocument::new("gap.txt", text);

    let chunks = split_documents(&[document], &ChunkingConfig::default());

    assert!(chunks.len() >= 2);
    assert!(chunks.iter().all(|c| !c.content.trim().is_empty()));
    assert!(chunks[0].content.starts_with("alpha"));
    assert!(chunks.last().is_some_and(|c| c.content.ends_with("omega")));
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.chunk_index, i);
        assert!(
            chunk
                .content
                .starts_with(chunk.overlap_with_predecessor.as_str())
        );
    }
}
