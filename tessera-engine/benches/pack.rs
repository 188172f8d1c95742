use divan::Bencher;
use tessera_dtype::DType;
use tessera_engine::{LAST_UNBOUNDED, Outcome, Segment, SpanOptions};
use tessera_error::{TesseraExpect, TesseraUnwrap};

fn main() {
    divan::main();
}

const ELEMENTS: usize = 1 << 10;

fn vector() -> DType {
    DType::vector(64, 2, 3, &DType::F64).tessera_unwrap()
}

fn block_indexed() -> DType {
    let displacements = (0..64).map(|i| i * 5 + i % 3).collect::<Vec<i64>>();
    DType::indexed_block(3, &displacements, &DType::I32).tessera_unwrap()
}

fn structure() -> DType {
    let inner = DType::vector(4, 1, 2, &DType::I16).tessera_unwrap();
    DType::structure(&[1, 3, 2], &[0, 8, 32], &[DType::I32, DType::F64, inner]).tessera_unwrap()
}

fn buffer_for(dtype: &DType) -> Vec<u8> {
    let extent = usize::try_from(dtype.extent()).tessera_expect("bench layouts have a positive extent");
    let len = extent * ELEMENTS;
    (0u8..=250).cycle().take(len).collect()
}

#[divan::bench(args = ["vector", "block_indexed", "struct"])]
fn pack_whole(bencher: Bencher, name: &str) {
    let dtype = match name {
        "vector" => vector(),
        "block_indexed" => block_indexed(),
        _ => structure(),
    };
    let buffer = buffer_for(&dtype);

    bencher.bench(|| tessera_engine::pack(&buffer, 0, ELEMENTS, &dtype).tessera_unwrap())
}

#[divan::bench(args = [64, 1024, 16384])]
fn pack_chunked(bencher: Bencher, chunk: usize) {
    let dtype = structure();
    let buffer = buffer_for(&dtype);
    let mut stream = vec![0u8; chunk];

    bencher.bench_local(|| {
        let mut segment = Segment::new(buffer.len(), 0, ELEMENTS, &dtype).tessera_unwrap();
        let mut first = 0i64;
        loop {
            let mut last = LAST_UNBOUNDED;
            let outcome = segment
                .pack(&buffer, first, &mut last, &mut stream)
                .tessera_unwrap();
            first = last;
            if outcome == Outcome::Complete {
                return first;
            }
        }
    })
}

#[divan::bench(args = [1, 16, usize::MAX])]
fn pack_to_spans(bencher: Bencher, ceiling: usize) {
    let dtype = block_indexed();
    let len = buffer_for(&dtype).len();

    bencher.bench_local(|| {
        let mut segment = Segment::new(len, 0, ELEMENTS, &dtype).tessera_unwrap();
        let mut spans = Vec::new();
        let mut first = 0i64;
        loop {
            let mut last = LAST_UNBOUNDED;
            let outcome = segment
                .pack_to_spans(first, &mut last, &mut spans, SpanOptions::new(ceiling))
                .tessera_unwrap();
            first = last;
            if outcome == Outcome::Complete {
                return spans.len();
            }
        }
    })
}
