use std::alloc::{GlobalAlloc, Layout, System};
use std::hint::black_box;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use epub_validator::xml::parse_document;
use epub_validator::zip::StreamingZip;
use epub_validator::{validate_epub_reader, validate_single_bytes, ValidationOptions};

#[path = "../tests/common/mod.rs"]
mod common;

const WARMUP_ITERS: usize = 2;
const MEASURE_ITERS: usize = 10;

/// Synthetic publication sizes, in chapters.
const SIZES: &[usize] = &[10, 100, 400];

struct TrackingAllocator;

static CURRENT_ALLOC_BYTES: AtomicUsize = AtomicUsize::new(0);
static PEAK_ALLOC_BYTES: AtomicUsize = AtomicUsize::new(0);

#[global_allocator]
static GLOBAL_ALLOCATOR: TrackingAllocator = TrackingAllocator;

fn current_alloc_bytes() -> usize {
    CURRENT_ALLOC_BYTES.load(Ordering::Relaxed)
}

fn reset_peak_alloc_bytes() {
    PEAK_ALLOC_BYTES.store(current_alloc_bytes(), Ordering::Relaxed);
}

fn add_current_alloc_bytes(delta: usize) {
    let current = CURRENT_ALLOC_BYTES.fetch_add(delta, Ordering::Relaxed) + delta;
    PEAK_ALLOC_BYTES.fetch_max(current, Ordering::Relaxed);
}

fn sub_current_alloc_bytes(delta: usize) {
    let _ = CURRENT_ALLOC_BYTES.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
        Some(current.saturating_sub(delta))
    });
}

unsafe impl GlobalAlloc for TrackingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { System.alloc(layout) };
        if !ptr.is_null() {
            add_current_alloc_bytes(layout.size());
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { System.dealloc(ptr, layout) };
        sub_current_alloc_bytes(layout.size());
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { System.alloc_zeroed(layout) };
        if !ptr.is_null() {
            add_current_alloc_bytes(layout.size());
        }
        ptr
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = unsafe { System.realloc(ptr, layout, new_size) };
        if !new_ptr.is_null() {
            if new_size >= layout.size() {
                add_current_alloc_bytes(new_size - layout.size());
            } else {
                sub_current_alloc_bytes(layout.size() - new_size);
            }
        }
        new_ptr
    }
}

struct CaseResult {
    fixture: String,
    case: &'static str,
    min: u128,
    median: u128,
    p90: u128,
    max: u128,
    median_peak_heap_bytes: usize,
}

fn percentile<T: Copy>(sorted: &[T], percentile: f64) -> T {
    let idx = ((sorted.len().saturating_sub(1) as f64) * percentile).round() as usize;
    sorted[idx]
}

fn run_case<F>(fixture: &str, case: &'static str, mut op: F) -> CaseResult
where
    F: FnMut() -> usize,
{
    for _ in 0..WARMUP_ITERS {
        black_box(op());
    }

    let mut samples = Vec::with_capacity(MEASURE_ITERS);
    let mut mem_samples = Vec::with_capacity(MEASURE_ITERS);
    for _ in 0..MEASURE_ITERS {
        let baseline = current_alloc_bytes();
        reset_peak_alloc_bytes();
        let start = Instant::now();
        black_box(op());
        samples.push(start.elapsed().as_nanos());
        mem_samples.push(PEAK_ALLOC_BYTES.load(Ordering::Relaxed).saturating_sub(baseline));
    }
    samples.sort_unstable();
    mem_samples.sort_unstable();

    CaseResult {
        fixture: fixture.to_string(),
        case,
        min: samples[0],
        median: percentile(&samples, 0.5),
        p90: percentile(&samples, 0.9),
        max: samples[samples.len() - 1],
        median_peak_heap_bytes: percentile(&mem_samples, 0.5),
    }
}

/// A publication of `chapters` chapters, each linking to the next and
/// sharing one stylesheet.
fn synthetic_publication(chapters: usize) -> (Vec<u8>, String) {
    let mut items = String::from(
        r#"<item id="css" href="style.css" media-type="text/css"/>"#,
    );
    let ids: Vec<String> = (0..chapters).map(|i| format!("c{}", i)).collect();
    for id in &ids {
        items.push_str(&format!(
            r#"<item id="{0}" href="{0}.xhtml" media-type="application/xhtml+xml"/>"#,
            id
        ));
    }
    let spine: Vec<&str> = ids.iter().map(String::as_str).collect();
    let opf = common::package(&items, &spine);

    let bodies: Vec<(String, String)> = (0..chapters)
        .map(|i| {
            let next = (i + 1) % chapters;
            let paragraphs: String = (0..40)
                .map(|p| format!(r#"<p id="p{0}">Paragraph {0} of chapter {1}.</p>"#, p, i))
                .collect();
            let body = format!(
                r#"<section id="s{0}"><h1>Chapter {0}</h1>{1}<p><a href="c{2}.xhtml#p3">next</a></p></section>"#,
                i, paragraphs, next
            );
            let head_title = format!("Chapter {}", i);
            let doc = common::chapter(&head_title, &body).replace(
                "</title>",
                r#"</title><link rel="stylesheet" href="style.css"/>"#,
            );
            (format!("EPUB/c{}.xhtml", i), doc)
        })
        .collect();

    let mut files: Vec<(&str, &str)> = vec![("EPUB/style.css", "body { margin: 0 } p { text-indent: 1em }")];
    files.extend(bodies.iter().map(|(name, doc)| (name.as_str(), doc.as_str())));
    let zip = common::build_zip(&common::publication(&opf, &files));
    let first = bodies.first().map(|(_, doc)| doc.clone()).unwrap_or_default();
    (zip, first)
}

fn main() {
    println!("# epub-validator benchmark");
    println!(
        "# warmup_iters={}, measure_iters={}",
        WARMUP_ITERS, MEASURE_ITERS
    );
    println!("fixture,case,min_ns,median_ns,p90_ns,max_ns,median_peak_heap_bytes");

    let mut results = Vec::new();
    for &chapters in SIZES {
        let fixture = format!("synthetic-{}", chapters);
        let (bytes, first_chapter) = synthetic_publication(chapters);

        results.push(run_case(&fixture, "zip/open_archive", || {
            let zip = StreamingZip::new(Cursor::new(bytes.as_slice())).expect("open failed");
            zip.num_entries()
        }));

        results.push(run_case(&fixture, "xml/parse_chapter", || {
            let doc = parse_document(first_chapter.as_bytes()).expect("parse failed");
            doc.len()
        }));

        results.push(run_case(&fixture, "validate/single_chapter", || {
            let report = validate_single_bytes(
                "c0.xhtml",
                first_chapter.as_bytes(),
                &ValidationOptions::default(),
            );
            report.diagnostics().len()
        }));

        results.push(run_case(&fixture, "validate/sequential", || {
            let report =
                validate_epub_reader(Cursor::new(bytes.clone()), &ValidationOptions::default());
            assert!(report.is_valid(), "{:?}", report);
            report.diagnostics().len()
        }));

        #[cfg(feature = "parallel")]
        results.push(run_case(&fixture, "validate/parallel", || {
            let options = ValidationOptions::default().with_parallel(true);
            let report = validate_epub_reader(Cursor::new(bytes.clone()), &options);
            report.diagnostics().len()
        }));
    }

    for result in &results {
        println!(
            "{},{},{},{},{},{},{}",
            result.fixture,
            result.case,
            result.min,
            result.median,
            result.p90,
            result.max,
            result.median_peak_heap_bytes
        );
    }
}
