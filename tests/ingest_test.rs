//! End-to-end ingestion through the pipeline, with fixtures written to
//! temporary directories.

mod common;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tempfile::TempDir;

use common::{
    epub_bytes, gzip_bytes, pdf_bytes, png_bytes, rar_bytes, sevenz_bytes, tar_bytes, write_file,
    xhtml, xz_bytes, zip_bytes,
};
use tome::import::{self, ParseContext, pdf};
use tome::{
    CancelToken, Config, CoverRef, CoverStrategy, Emphasis, Error, FileSource,
    MemorySource, Pipeline, Request, SourceFormat, TextBlock,
};

const OPF: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:opf="http://www.idpf.org/2007/opf">
    <dc:title>The Voyage</dc:title>
    <dc:creator opf:role="aut">Ann Lee</dc:creator>
    <dc:description>&lt;p&gt;A &lt;b&gt;sea&lt;/b&gt; story.&lt;/p&gt;</dc:description>
    <meta name="cover" content="cover-img"/>
  </metadata>
  <manifest>
    <item id="c1" href="one.xhtml" media-type="application/xhtml+xml"/>
    <item id="c2" href="two.xhtml" media-type="application/xhtml+xml"/>
    <item id="cover-img" href="images/cover.png" media-type="image/png"/>
  </manifest>
  <spine><itemref idref="c1"/><itemref idref="c2"/></spine>
</package>"#;

fn voyage_epub() -> Vec<u8> {
    let cover = png_bytes(30, 45, [10, 20, 30, 255]);
    epub_bytes(
        OPF,
        &[
            ("one.xhtml", &xhtml("One", "<h1>One</h1><p>It was <b>dark</b>.</p>")),
            ("two.xhtml", &xhtml("Two", "<h2>Two</h2><p>Next.</p><hr/><p>After.</p>")),
        ],
        &[("OEBPS/images/cover.png", &cover)],
    )
}

#[test]
fn test_txt_first_line_becomes_chapter() {
    let pipeline = Pipeline::default();
    let source = MemorySource::new("hello.txt", b"Hello\nWorld".to_vec());
    assert_eq!(
        pipeline.content(&source).unwrap(),
        vec![TextBlock::chapter("Hello", 0), TextBlock::plain_paragraph("World")]
    );
}

#[test]
fn test_txt_separator_line() {
    let pipeline = Pipeline::default();
    let source = MemorySource::new("abc.txt", b"A\n***\nB".to_vec());
    assert_eq!(
        pipeline.content(&source).unwrap(),
        vec![
            TextBlock::chapter("A", 0),
            TextBlock::Separator,
            TextBlock::plain_paragraph("B"),
        ]
    );
}

#[test]
fn test_txt_only_separators_is_empty() {
    let pipeline = Pipeline::default();
    let source = MemorySource::new("breaks.txt", b"***\n* * *\n".to_vec());
    assert!(matches!(pipeline.content(&source), Err(Error::EmptyResult)));
}

#[test]
fn test_txt_inline_markup() {
    let pipeline = Pipeline::default();
    let source = MemorySource::new("m.txt", b"Title\nA **loud** word".to_vec());
    let blocks = pipeline.content(&source).unwrap();
    let TextBlock::Paragraph { runs } = &blocks[1] else {
        panic!("expected paragraph, got {:?}", blocks[1]);
    };
    assert_eq!(blocks[1].text(), "A loud word");
    assert!(runs.iter().any(|r| r.text == "loud" && r.emphasis.bold));
}

#[test]
fn test_hash_is_deterministic_and_path_independent() {
    let dir = TempDir::new().unwrap();
    let a = write_file(dir.path(), "a.epub", b"identical bytes");
    let b = write_file(dir.path(), "renamed.bin", b"identical bytes");
    let pipeline = Pipeline::default();

    let first = pipeline.hash(&FileSource::new(&a)).unwrap();
    assert_eq!(first, pipeline.hash(&FileSource::new(&a)).unwrap());
    assert_eq!(first, pipeline.hash(&FileSource::new(&b)).unwrap());
    let memory = MemorySource::new("x", b"identical bytes".to_vec()).with_uri("content://books/7");
    assert_eq!(first, pipeline.hash(&memory).unwrap());
    assert_eq!(first.to_string().len(), 16);
    assert!(first.to_string().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));

    let other = MemorySource::new("y", b"different bytes".to_vec());
    assert_ne!(first, pipeline.hash(&other).unwrap());
}

#[test]
fn test_epub_metadata_and_content() {
    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "voyage.epub", &voyage_epub());
    let source = FileSource::new(&path);
    let pipeline = Pipeline::default();

    let imported = pipeline.import(&source, Request::ALL).unwrap();
    let record = imported.record.unwrap();
    assert_eq!(record.title, "The Voyage");
    assert_eq!(record.authors, vec!["Ann Lee"]);
    assert_eq!(record.description.as_deref(), Some("A sea story."));
    assert_eq!(record.cover, Some(CoverRef::Entry("OEBPS/images/cover.png".into())));
    assert_eq!(record.format, SourceFormat::Epub);
    assert_eq!(record.source_path, path.to_string_lossy());

    let blocks = imported.blocks.unwrap();
    let texts: Vec<String> = blocks.iter().map(TextBlock::text).collect();
    assert_eq!(texts, ["One", "It was dark.", "Two", "Next.", "", "After."]);
    assert_eq!(blocks[0], TextBlock::chapter("One", 0));
    assert_eq!(blocks[2], TextBlock::chapter("Two", 1));
    assert_eq!(blocks[4], TextBlock::Separator);
    let TextBlock::Paragraph { runs } = &blocks[1] else {
        panic!("expected paragraph");
    };
    assert!(runs.iter().any(|r| r.text == "dark"
        && r.emphasis
            == Emphasis {
                bold: true,
                ..Emphasis::PLAIN
            }));

    let cover = pipeline.cover(&source, &record);
    assert_eq!(cover.strategy, CoverStrategy::Declared);
    assert_eq!((cover.width(), cover.height()), (30, 45));
}

#[test]
fn test_epub_cover_falls_back_to_only_image() {
    let opf = r#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/"><dc:title>Plain</dc:title></metadata>
  <manifest>
    <item id="c1" href="one.xhtml" media-type="application/xhtml+xml"/>
    <item id="pic" href="art/pic.jpg" media-type="image/jpeg"/>
  </manifest>
  <spine><itemref idref="c1"/></spine>
</package>"#;
    let bytes = epub_bytes(opf, &[("one.xhtml", &xhtml("x", "<p>Body</p>"))], &[]);
    let source = MemorySource::new("plain.epub", bytes);
    let record = Pipeline::default().metadata(&source).unwrap();
    assert_eq!(record.cover, Some(CoverRef::Entry("OEBPS/art/pic.jpg".into())));
    assert_eq!(record.authors, vec!["Unknown Author"]);
}

#[test]
fn test_truncated_epub_is_corrupt_but_metadata_survives() {
    let mut bytes = voyage_epub();
    let len = bytes.len();
    bytes.truncate(len - 12);
    let source = MemorySource::new("voyage.epub", bytes);
    let config = Config::default();
    let cancel = CancelToken::new();
    let ctx = ParseContext::new(&config, &cancel);

    assert!(matches!(
        import::epub::content(&source, ctx),
        Err(Error::CorruptContainer(_))
    ));
    assert!(matches!(
        import::epub::metadata(&source, ctx),
        Err(Error::CorruptContainer(_))
    ));

    let pipeline = Pipeline::default();
    let record = pipeline.metadata(&source).unwrap();
    assert_eq!(record.title, "voyage");
    assert!(matches!(pipeline.content(&source), Err(Error::CorruptContainer(_))));
}

#[test]
fn test_fb2_with_embedded_cover() {
    let png = png_bytes(8, 12, [1, 2, 3, 255]);
    let fb2 = format!(
        r##"<?xml version="1.0" encoding="utf-8"?>
<FictionBook xmlns="http://www.gribuser.ru/xml/fictionbook/2.0" xmlns:l="http://www.w3.org/1999/xlink">
  <description><title-info>
    <author><first-name>Leo</first-name><last-name>Tolstoy</last-name></author>
    <book-title>Short Tale</book-title>
    <annotation><p>An annotation.</p></annotation>
    <coverpage><image l:href="#cover.png"/></coverpage>
  </title-info></description>
  <body><section><title><p>Part One</p></title><p>First <strong>bold</strong> line.</p></section></body>
  <binary id="cover.png" content-type="image/png">{}</binary>
</FictionBook>"##,
        STANDARD.encode(&png)
    );
    let source = MemorySource::new("tale.fb2", fb2.into_bytes());
    let pipeline = Pipeline::default();

    let record = pipeline.metadata(&source).unwrap();
    assert_eq!(record.title, "Short Tale");
    assert_eq!(record.authors, vec!["Leo Tolstoy"]);
    assert_eq!(record.description.as_deref(), Some("An annotation."));
    assert!(matches!(record.cover, Some(CoverRef::Embedded(_))));

    let blocks = pipeline.content(&source).unwrap();
    assert_eq!(blocks[0], TextBlock::chapter("Part One", 0));
    assert_eq!(blocks[1].text(), "First bold line.");

    let cover = pipeline.cover(&source, &record);
    assert_eq!(cover.strategy, CoverStrategy::Declared);
    assert_eq!(cover.width(), 8);
}

#[test]
fn test_zipped_fb2() {
    let fb2 = br#"<?xml version="1.0"?>
<FictionBook><description><title-info><book-title>Zipped</book-title></title-info></description>
<body><section><p>First line.</p><p>Second line.</p></section></body></FictionBook>"#;
    let source = MemorySource::new("z.fb2.zip", zip_bytes(&[("z.fb2", fb2.as_slice())]));
    let pipeline = Pipeline::default();
    assert_eq!(pipeline.metadata(&source).unwrap().title, "Zipped");
    assert_eq!(
        pipeline.content(&source).unwrap(),
        vec![
            TextBlock::chapter("First line.", 0),
            TextBlock::plain_paragraph("Second line."),
        ]
    );
}

#[test]
fn test_html_document() {
    let html = br#"<!DOCTYPE html><html><head><title>Page</title>
<meta name="author" content="Web Writer"><meta name="description" content="About it"></head>
<body><h1>Heading</h1><p>Some <em>styled</em> text.</p><script>ignored()</script></body></html>"#;
    let source = MemorySource::new("page.html", html.to_vec());
    let pipeline = Pipeline::default();

    let record = pipeline.metadata(&source).unwrap();
    assert_eq!(record.title, "Page");
    assert_eq!(record.authors, vec!["Web Writer"]);
    assert_eq!(record.description.as_deref(), Some("About it"));

    let blocks = pipeline.content(&source).unwrap();
    let texts: Vec<String> = blocks.iter().map(TextBlock::text).collect();
    assert_eq!(texts, ["Heading", "Some styled text."]);
}

#[test]
fn test_fodt_sniffed_without_extension() {
    let fodt = br#"<?xml version="1.0"?>
<office:document xmlns:office="urn:oasis:names:tc:opendocument:xmlns:office:1.0"
  xmlns:text="urn:oasis:names:tc:opendocument:xmlns:text:1.0">
  <office:body><office:text>
    <text:h text:outline-level="1">Intro</text:h><text:p>Words.</text:p>
  </office:text></office:body>
</office:document>"#;
    let source = MemorySource::new("document", fodt.to_vec());
    let blocks = Pipeline::default().content(&source).unwrap();
    assert_eq!(
        blocks,
        vec![TextBlock::chapter("Intro", 0), TextBlock::plain_paragraph("Words.")]
    );
}

#[test]
fn test_pdf_through_pipeline() {
    let dir = TempDir::new().unwrap();
    let bytes = pdf_bytes(
        &[&["Preface", "Words on a page."], &["More words."]],
        &[("Title", "Report"), ("Author", "Ann Lee, Bo Park")],
    );
    let path = write_file(dir.path(), "report.pdf", &bytes);
    let source = FileSource::new(&path);
    let pipeline = Pipeline::default();

    let record = pipeline.metadata(&source).unwrap();
    assert_eq!(record.title, "Report");
    assert_eq!(record.authors, vec!["Ann Lee", "Bo Park"]);
    assert_eq!(record.cover, Some(CoverRef::Page(0)));

    let blocks = pipeline.content(&source).unwrap();
    assert_eq!(
        blocks,
        vec![
            TextBlock::chapter("Preface", 0),
            TextBlock::plain_paragraph("Words on a page."),
            TextBlock::plain_paragraph("More words."),
        ]
    );

    let hits = pdf::search(&source, "words", pipeline.config(), pipeline.cancel_token()).unwrap();
    assert_eq!(hits.iter().map(|h| h.page).collect::<Vec<_>>(), [0, 1]);
}

#[test]
fn test_comic_tar_xz_pages_sorted() {
    let png = png_bytes(4, 4, [9, 9, 9, 255]);
    let tar = tar_bytes(&[
        ("issue/10.png", png.as_slice()),
        ("issue/02.png", png.as_slice()),
        ("issue/01.png", png.as_slice()),
    ]);
    let source = MemorySource::new("issue.cbt", xz_bytes(&tar));
    let pipeline = Pipeline::default();

    let pages = comic_pages(&pipeline.content(&source).unwrap());
    assert_eq!(pages, ["issue/01.png", "issue/02.png", "issue/10.png"]);

    let record = pipeline.metadata(&source).unwrap();
    assert_eq!(record.format, SourceFormat::Comic);
    assert_eq!(pipeline.cover(&source, &record).strategy, CoverStrategy::Declared);
}

fn comic_pages(blocks: &[TextBlock]) -> Vec<String> {
    blocks
        .iter()
        .map(|b| match b {
            TextBlock::Image {
                target: CoverRef::Entry(name),
            } => name.clone(),
            other => panic!("unexpected {other:?}"),
        })
        .collect()
}

/// Pages in reverse archive order, plus a ComicInfo naming the issue.
fn comic_entries(png: &[u8]) -> Vec<(&'static str, &[u8])> {
    vec![
        ("02.png", png),
        ("ComicInfo.xml", b"<ComicInfo><Title>Night Shift</Title></ComicInfo>".as_slice()),
        ("01.png", png),
    ]
}

#[test]
fn test_comic_7z_pages_and_cover() {
    let png = png_bytes(6, 9, [200, 10, 10, 255]);
    let source = MemorySource::new("shift.cb7", sevenz_bytes(&comic_entries(&png)));
    let pipeline = Pipeline::default();

    assert_eq!(comic_pages(&pipeline.content(&source).unwrap()), ["01.png", "02.png"]);

    let record = pipeline.metadata(&source).unwrap();
    assert_eq!(record.title, "Night Shift");
    assert_eq!(record.cover, Some(CoverRef::Entry("01.png".into())));
    let cover = pipeline.cover(&source, &record);
    assert_eq!(cover.strategy, CoverStrategy::Declared);
    assert_eq!((cover.width(), cover.height()), (6, 9));
}

#[test]
fn test_comic_tar_gzip_pages_sorted() {
    let png = png_bytes(4, 4, [9, 9, 9, 255]);
    let tar = tar_bytes(&comic_entries(&png));
    let source = MemorySource::new("shift.cbt", gzip_bytes(&tar));
    let pipeline = Pipeline::default();

    assert_eq!(comic_pages(&pipeline.content(&source).unwrap()), ["01.png", "02.png"]);
    let record = pipeline.metadata(&source).unwrap();
    assert_eq!(record.title, "Night Shift");
    assert_eq!(pipeline.cover(&source, &record).strategy, CoverStrategy::Declared);
}

#[test]
fn test_comic_rar_from_memory_and_disk() {
    let png = png_bytes(5, 7, [0, 90, 180, 255]);
    let data = rar_bytes(&comic_entries(&png));
    let pipeline = Pipeline::default();

    // Without a path the archive is spilled to a temporary file first.
    let source = MemorySource::new("shift.cbr", data.clone());
    assert_eq!(comic_pages(&pipeline.content(&source).unwrap()), ["01.png", "02.png"]);
    let record = pipeline.metadata(&source).unwrap();
    assert_eq!(record.title, "Night Shift");
    let cover = pipeline.cover(&source, &record);
    assert_eq!(cover.strategy, CoverStrategy::Declared);
    assert_eq!((cover.width(), cover.height()), (5, 7));

    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "shift.cbr", &data);
    let source = FileSource::new(&path);
    assert_eq!(comic_pages(&pipeline.content(&source).unwrap()), ["01.png", "02.png"]);
    assert_eq!(pipeline.metadata(&source).unwrap().title, "Night Shift");
}

#[test]
fn test_cancelled_import_returns_nothing() {
    let cancel = CancelToken::new();
    let pipeline = Pipeline::new(Config::default()).with_cancel(cancel.clone());
    let source = MemorySource::new("voyage.epub", voyage_epub());
    cancel.cancel();
    assert!(matches!(
        pipeline.import(&source, Request::CONTENT),
        Err(Error::Cancelled)
    ));
}

#[test]
fn test_batch_reports_skipped_files() {
    let dir = TempDir::new().unwrap();
    let good = write_file(dir.path(), "good.txt", b"Good\nText");
    let bad = write_file(dir.path(), "bad.txt", b"***");
    let missing = dir.path().join("missing.txt");
    let sources: Vec<FileSource> = [good, bad, missing].iter().map(FileSource::new).collect();

    let report = Pipeline::default().import_batch(&sources, Request::ALL);
    assert_eq!(report.imported.len(), 1);
    assert_eq!(report.imported[0].0, "good.txt");
    assert_eq!(report.skipped(), 2);
    assert!(
        report
            .failed
            .iter()
            .any(|(name, e)| name == "missing.txt" && matches!(e, Error::UnreadableSource(_)))
    );
}
