use divan::AllocProfiler;

#[global_allocator]
static ALLOC: AllocProfiler = AllocProfiler::system();

fn main() {
    divan::main();
}

pub mod drain {
    use divan::Bencher;
    use flate2::{write::ZlibEncoder, Compression};
    use gar_core::{Codec, Container, FixedBlockTable, Resource};
    use std::io::{self, Write};

    const BLOCK: usize = 64 * 1024;
    const BLOCKS: usize = 16;

    fn get_input() -> Resource {
        let mut data = Vec::new();
        let mut offsets = Vec::new();
        let mut lengths = Vec::new();
        for i in 0..BLOCKS {
            let plain: Vec<u8> = (0..BLOCK).map(|j| ((i * j) % 251) as u8).collect();
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&plain).unwrap();
            let packed = encoder.finish().unwrap();
            offsets.push(data.len() as u64);
            lengths.push(packed.len() as u64);
            data.extend_from_slice(&packed);
        }

        let container = Container::from_bytes("bench", data);
        let total = (BLOCK * BLOCKS) as u64;
        Resource::new(container, "bench.bin", 0, 0, total).with_exporter(FixedBlockTable::new(
            Codec::Zlib,
            offsets,
            lengths,
            vec![BLOCK as u64; BLOCKS],
        ))
    }

    #[divan::bench]
    fn open(bencher: Bencher) {
        bencher.with_inputs(get_input).bench_refs(|resource| {
            divan::black_box(resource.effective_decoder().unwrap());
        });
    }

    #[divan::bench(sample_count = 10)]
    fn drain_block_table(bencher: Bencher) {
        bencher.with_inputs(get_input).bench_refs(|resource| {
            gar_core::drain(resource, &mut io::sink()).unwrap();
        });
    }

    #[divan::bench(sample_count = 10)]
    fn drain_byte_at_a_time(bencher: Bencher) {
        bencher.with_inputs(get_input).bench_refs(|resource| {
            let mut reader = resource.effective_decoder().unwrap();
            let mut checksum = 0u8;
            while reader.available().unwrap() {
                checksum ^= reader.read_byte().unwrap();
            }
            divan::black_box(checksum);
        });
    }
}
