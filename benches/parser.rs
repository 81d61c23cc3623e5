use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::{Rng, SeedableRng};
use rfxvote::{
    config::{ExclusionRules, RfxConfiguration},
    rfx::ParsedRfxPage,
    signature,
};

fn generate_rfx_page(votes: u64) -> String {
    // generate inputs from fixed seeds
    let mut rng = rand_xoshiro::Xoshiro256PlusPlus::seed_from_u64(votes); /* define specific algorithm to ensure reproducibility */

    let mut page = String::from(
        "===[[Wikipedia:Requests for adminship/Candidate|Candidate]]===\n\
         '''Final (0/0/0); Scheduled to end 18:00, 14 August 2017 (UTC)'''\n\n\
         Nomination statement.\n",
    );

    const SECTIONS: &[&str] = &["Support", "Oppose", "Neutral"];
    const SIGNATURES: &[&str] = &[
        "[[User:{}|{}]] ([[User talk:{}|talk]])",
        "{{unsigned|{}}}",
        "{{unsigned2|12:00, 1 May 2010|{}}}",
        "[[User:{}/sig|{}]]",
        "{{User:{}/sig}}",
    ];

    for section in SECTIONS {
        page.push_str(&format!("\n===={section}====\n"));
        for _ in 0..votes / 3 {
            let user = format!("User{}", rng.gen_range(0..votes));
            let signature = SIGNATURES[rng.gen_range(0..SIGNATURES.len())].replace("{}", &user);
            page.push_str(&format!("# Some reasoning for the vote. {signature} 12:00, 1 May 2010 (UTC)\n"));
            if rng.gen_bool(0.3) {
                page.push_str("#: A reply to the vote. [[User:Replier]]\n");
            }
        }
    }

    page
}

fn bench_parse(c: &mut Criterion) {
    let config = RfxConfiguration::new(
        "en.wikipedia.org",
        ["Support", "Oppose", "Neutral"],
        r"scheduled to end (\d{2}:\d{2}, \d{1,2} \w+ \d{4}) \(UTC\)",
        4,
        ["Requests_for_adminship"],
        ExclusionRules::default(),
    )
    .unwrap();

    let mut group = c.benchmark_group("parse_rfx_page");
    for votes in [30u64, 150u64, 600u64].into_iter() {
        let input = generate_rfx_page(votes);
        group.bench_with_input(BenchmarkId::new("Parse", votes), &input, |b, i| {
            b.iter(|| ParsedRfxPage::parse(i, &config));
        });
        group.bench_with_input(BenchmarkId::new("FindSignatures", votes), &input, |b, i| {
            b.iter(|| i.lines().map(signature::find_signatures).count());
        });
    }
}

criterion_group!(benches, bench_parse);
criterion_main!(benches);
