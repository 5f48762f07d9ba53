use std::io::Write;

use kmer_seed::index::{artifact_path, IndexOpt, IndexParams, IndexState, KmerIndex};
use kmer_seed::io::{Reference, SequenceSource};
use kmer_seed::IndexError;

fn make_seq(len: usize, seed: u32) -> String {
    let bases = ['A', 'C', 'G', 'T'];
    let mut x = seed;
    (0..len)
        .map(|_| {
            x = x.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            bases[(x >> 16) as usize % 4]
        })
        .collect()
}

/// 写一个多 contig 的 FASTA，其中带重复片段和小写碱基
fn write_fasta(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("genome.fa");
    let mut f = std::fs::File::create(&path).unwrap();
    let repeat = "ACGTTGCAACGT";
    writeln!(f, ">chr1 test contig").unwrap();
    writeln!(f, "{}{}{}", make_seq(200, 1), repeat, make_seq(60, 2)).unwrap();
    writeln!(f, ">chr2").unwrap();
    writeln!(f, "{}", make_seq(150, 3).to_lowercase()).unwrap();
    writeln!(f, "{}{}", repeat, make_seq(40, 4)).unwrap();
    writeln!(f, ">chrM").unwrap();
    writeln!(f, "ACGT").unwrap();
    path
}

fn build(reference: &Reference, params: IndexParams) -> KmerIndex {
    let mut idx = KmerIndex::new(params.clone()).unwrap();
    let mut opt = IndexOpt::new(params);
    opt.threads = 2;
    opt.batch_size = 64;
    idx.build(reference, &opt).unwrap();
    idx
}

#[test]
fn offsets_cover_contig_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let reference = Reference::from_path(write_fasta(dir.path())).unwrap();
    let k = 11;
    let idx = build(&reference, IndexParams::new(k));
    for contig in idx.contigs() {
        let len = reference.contig_len(&contig.name).unwrap();
        let mut all: Vec<u32> = contig.entries().flat_map(|(_, p)| p.iter().copied()).collect();
        all.sort_unstable();
        let expected: Vec<u32> = if len >= k { (0..=(len - k) as u32).collect() } else { Vec::new() };
        assert_eq!(all, expected, "contig {}", contig.name);
    }
}

#[test]
fn query_results_match_reference() {
    let dir = tempfile::tempdir().unwrap();
    let reference = Reference::from_path(write_fasta(dir.path())).unwrap();
    let k = 12;
    let idx = build(&reference, IndexParams::new(k));
    for contig in idx.contigs() {
        for (kmer, positions) in contig.entries() {
            let found = idx.query(&contig.name, kmer).unwrap();
            assert_eq!(found, positions);
            assert!(found.windows(2).all(|w| w[0] < w[1]));
            for &p in found {
                let p = p as usize;
                assert_eq!(reference.fetch(&contig.name, p, p + k).unwrap().as_ref(), kmer);
            }
        }
    }
    // 重复片段在两条 contig 上各出现一次
    assert_eq!(idx.query("chr1", b"ACGTTGCAACGT").unwrap(), &[200]);
    assert_eq!(idx.query("chr2", b"acgttgcaacgt").unwrap(), &[150]);
}

#[test]
fn persistence_roundtrip_via_file() {
    let dir = tempfile::tempdir().unwrap();
    let fasta = write_fasta(dir.path());
    let reference = Reference::from_path(&fasta).unwrap();

    for params in [
        IndexParams::new(9),
        IndexParams::new(15).with_minimizer_width(Some(7)).with_canonical(true),
    ] {
        let idx = build(&reference, params);
        let out = dir.path().join(artifact_path(&fasta));
        idx.save_to_file(&out).unwrap();
        assert!(out.exists());
        assert!(!dir.path().join("genome.kidx.tmp").exists());

        let back = KmerIndex::load_from_file(&out).unwrap();
        assert_eq!(back.state(), IndexState::Built);
        assert_eq!(back.params(), idx.params());
        assert_eq!(back.source_descriptor(), idx.source_descriptor());
        assert_eq!(back.contigs(), idx.contigs());
        assert_eq!(back.stats(), idx.stats());
        let names: Vec<&str> = back.contig_names().collect();
        assert_eq!(names, vec!["chr1", "chr2", "chrM"]);
    }
}

#[test]
fn garbage_file_is_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("junk.kidx");
    std::fs::write(&path, b"definitely not an index").unwrap();
    assert!(matches!(KmerIndex::load_from_file(&path), Err(IndexError::CorruptArtifact(_))));
}

#[test]
fn query_contract_errors() {
    let reference = Reference::from_sequences("mem", [("chr1", "ACGTACGTAC")]).unwrap();
    let idx = build(&reference, IndexParams::new(4));
    assert!(matches!(idx.query("nope", b"ACGT"), Err(IndexError::UnknownContig(_))));
    assert!(matches!(idx.query("chr1", b"ACGTA"), Err(IndexError::InvalidParameter { .. })));
    assert!(idx.query("chr1", b"TTTT").unwrap().is_empty());
}

#[test]
fn concurrent_readers() {
    let reference = Reference::from_sequences("mem", [("chr1", make_seq(2_000, 9))]).unwrap();
    let idx = build(&reference, IndexParams::new(10));
    let seq = reference.sequence("chr1").unwrap();
    std::thread::scope(|s| {
        for t in 0..4 {
            let idx = &idx;
            s.spawn(move || {
                for off in (t * 100..t * 100 + 100).step_by(7) {
                    let hits = idx.query("chr1", &seq[off..off + 10]).unwrap();
                    assert!(hits.contains(&(off as u32)));
                }
            });
        }
    });
}
