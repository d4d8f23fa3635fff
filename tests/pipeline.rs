//! End-to-end checks over synthetic captures

use subghz_analyzer::classifier::features::entropy;
use subghz_analyzer::{
    analyze, best_match, classify, compare, decode, extract_fields, identify_protocol, parse,
    Encoding, Preset, ProtocolName, Signal, SignalType,
};

const TE: i32 = 350;
const FREQUENCY: u64 = 433_920_000;

fn bits_of(value: u64, width: usize) -> Vec<u8> {
    (0..width).rev().map(|i| ((value >> i) & 1) as u8).collect()
}

/// PT2262 style frame: 0 = te high + 3te low, 1 = 3te high + te low, then a
/// sync mark and a 31te gap
fn tristate_frame(bits: &[u8], te: i32) -> Vec<i32> {
    let mut out = Vec::with_capacity(bits.len() * 2 + 2);
    for &b in bits {
        if b == 1 {
            out.extend_from_slice(&[3 * te, -te]);
        } else {
            out.extend_from_slice(&[te, -3 * te]);
        }
    }
    out.extend_from_slice(&[te, -31 * te]);
    out
}

fn repeated(bits: &[u8], repeats: usize, te: i32) -> Vec<i32> {
    (0..repeats).flat_map(|_| tristate_frame(bits, te)).collect()
}

fn capture(durations: &[i32]) -> Signal {
    Signal::from_durations(FREQUENCY, Preset::Ook650, durations).unwrap()
}

fn princeton_capture(code: u64) -> Signal {
    capture(&repeated(&bits_of(code, 24), 4, TE))
}

#[test]
fn test_pipeline_is_deterministic() {
    let signal = princeton_capture(0xA5C3F0);
    let first = analyze(signal.clone());
    let second = analyze(signal);
    assert_eq!(first, second);
}

#[test]
fn test_decode_is_idempotent() {
    let signal = princeton_capture(0x3C0F5A);
    let decoded = decode(&signal, None);
    let timing = decoded.timing().unwrap();
    let te = timing.short_us.round() as i32;

    // re-synthesize every recovered frame from the learned timing
    let mut durations = Vec::new();
    for span in decoded.frames() {
        durations.extend(tristate_frame(
            &decoded.bits()[span.start..span.start + span.len],
            te,
        ));
    }
    let again = decode(&capture(&durations), None);
    assert_eq!(again.bits(), decoded.bits());
    assert_eq!(again.encoding(), decoded.encoding());
    assert_eq!(again.frames(), decoded.frames());
}

#[test]
fn test_entropy_boundaries() {
    assert_eq!(entropy(&[0; 32]), 0.0);
    assert_eq!(entropy(&[1; 32]), 0.0);
    let alternating: Vec<u8> = (0..32).map(|i| (i % 2) as u8).collect();
    assert!((entropy(&alternating) - 1.0).abs() < 1e-12);
}

#[test]
fn test_short_low_entropy_ook_is_fixed() {
    let mut bits = vec![0u8; 20];
    bits[3] = 1;
    let signal = capture(&repeated(&bits, 4, TE));
    let decoded = decode(&signal, None);
    assert_eq!(decoded.encoding(), Encoding::Ook);
    assert_eq!(decoded.primary_frame(), &bits[..]);

    let classification = classify(&signal, &decoded);
    assert_eq!(classification.signal_type, SignalType::Fixed);
    assert!(classification.confidence > 0.6);
}

#[test]
fn test_princeton_round_trip() {
    let signal = princeton_capture(0xA5C3F0);
    let analysis = analyze(signal);

    assert_eq!(analysis.decoded.encoding(), Encoding::Ook);
    assert_eq!(analysis.decoded.len(), 96);
    assert_eq!(analysis.decoded.frames().len(), 4);
    assert_eq!(analysis.decoded.primary_frame(), &bits_of(0xA5C3F0, 24)[..]);
    assert!(analysis.decoded.confidence() > 0.8);

    let best = analysis.best_match().unwrap();
    assert_eq!(best.name, ProtocolName::Princeton);
    assert!((best.confidence - 1.0).abs() < 1e-9);
    assert_eq!(best.fields["address"].value, 0xA5C3);
    assert_eq!(best.fields["data"].value, 0xF0);

    let fields = extract_fields(&analysis.decoded, ProtocolName::Princeton);
    assert!(!fields["address"].binary.is_empty());
    assert!(!fields["data"].binary.is_empty());

    assert_eq!(analysis.classification.signal_type, SignalType::Fixed);
}

#[test]
fn test_jittered_princeton_stays_fixed() {
    // deterministic +-30 us jitter on every data pulse
    let mut durations = repeated(&bits_of(0xA5C3F0, 24), 4, TE);
    for (i, d) in durations.iter_mut().enumerate() {
        if d.abs() < 4000 {
            *d += (((i * 37) % 61) as i32 - 30) * d.signum();
        }
    }
    let analysis = analyze(capture(&durations));

    assert_eq!(analysis.decoded.encoding(), Encoding::Ook);
    assert_eq!(analysis.decoded.frames().len(), 4);
    assert_eq!(analysis.decoded.primary_frame(), &bits_of(0xA5C3F0, 24)[..]);
    assert_eq!(
        analysis.best_match().map(|m| m.name),
        Some(ProtocolName::Princeton)
    );
    assert_eq!(analysis.classification.signal_type, SignalType::Fixed);
}

#[test]
fn test_unknown_protocol() {
    let signal = capture(&repeated(&bits_of(0x1B5E3C7A9, 37), 4, TE));
    let decoded = decode(&signal, None);
    assert_eq!(decoded.primary_frame().len(), 37);

    assert!(identify_protocol(&signal, &decoded).is_empty());
    let best = best_match(&signal, &decoded);
    assert!(best.is_unknown());
    assert_eq!(best.name.as_str(), "unknown");
    assert_eq!(best.confidence, 0.0);
}

#[test]
fn test_compare_is_symmetric() {
    let a = analyze(princeton_capture(0xA5C3F0));
    let b = analyze(capture(&repeated(&bits_of(0x1B5E3C7A9, 37), 4, TE)));
    let ab = compare(&a, &b);
    let ba = compare(&b, &a);
    assert_eq!(ab.probability, ba.probability);
    assert_eq!(ab.factors, ba.factors);

    let same = compare(&a, &analyze(princeton_capture(0xA5C3F0)));
    assert!((same.probability - 1.0).abs() < 1e-9);
    assert!(same.probability > ab.probability);
}

#[test]
fn test_noise_injection_keeps_encoding() {
    let clean = repeated(&bits_of(0xA5C3F0, 24), 4, TE);
    let baseline = decode(&capture(&clean), None);

    // replace one in twenty data pulses with a 60 us glitch or a 2500 us
    // stretch, keeping its level
    let mut noisy = clean.clone();
    let mut seen = 0usize;
    let mut replaced = 0usize;
    for d in noisy.iter_mut() {
        if d.abs() >= 4000 {
            continue;
        }
        if seen % 20 == 7 {
            let v = if replaced % 2 == 0 { 60 } else { 2500 };
            *d = v * d.signum();
            replaced += 1;
        }
        seen += 1;
    }
    assert_eq!(replaced, 10);

    let decoded = decode(&capture(&noisy), None);
    assert_eq!(decoded.encoding(), Encoding::Ook);
    assert!(!decoded.is_empty());
    assert!(decoded.confidence() < baseline.confidence());
    assert!(!decoded.warnings().is_empty());
}

#[test]
fn test_parse_and_analyze_text_capture() {
    let mut text = String::from(
        "Filetype: Flipper SubGhz RAW File\n\
         Version: 1\n\
         Frequency: 433920000\n\
         Preset: FuriHalSubGhzPresetOok650Async\n\
         Protocol: RAW\n",
    );
    let durations = repeated(&bits_of(0xA5C3F0, 24), 4, TE);
    for chunk in durations.chunks(64) {
        let line: Vec<String> = chunk.iter().map(i32::to_string).collect();
        text.push_str(&format!("RAW_Data: {}\n", line.join(" ")));
    }

    let signal = parse(&text).unwrap();
    assert_eq!(signal.frequency(), FREQUENCY);
    assert_eq!(signal.pulses().len(), durations.len());

    let analysis = analyze(signal);
    assert_eq!(
        analysis.best_match().map(|m| m.name),
        Some(ProtocolName::Princeton)
    );
}
