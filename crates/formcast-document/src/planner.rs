// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Replacement planner — pairs each sighting with its substitution value and
// decides how the value is laid out in the placeholder's space.
//
// Pure: no document access, no I/O. The same sightings and map always give
// the same instructions.

use formcast_core::{
    FillOptions, FitPolicy, PlaceholderSighting, ReplacementInstruction, SubstitutionMap,
};
use tracing::{debug, warn};

use crate::pdf::StandardFont;

/// Width slack when comparing measured text against the available space.
const FIT_TOLERANCE: f32 = 1e-3;

/// Turns sightings into replacement instructions.
#[derive(Debug, Clone)]
pub struct ReplacementPlanner {
    options: FillOptions,
}

impl ReplacementPlanner {
    pub fn new(options: FillOptions) -> Self {
        Self { options }
    }

    /// One instruction per sighting, ordered by page, then top to bottom,
    /// then left to right.
    pub fn plan(
        &self,
        sightings: &[PlaceholderSighting],
        map: &SubstitutionMap,
    ) -> Vec<ReplacementInstruction> {
        let mut ordered: Vec<&PlaceholderSighting> = sightings.iter().collect();
        ordered.sort_by(|a, b| {
            a.page_index
                .cmp(&b.page_index)
                .then(b.position.y.total_cmp(&a.position.y))
                .then(a.position.x.total_cmp(&b.position.x))
        });

        let instructions: Vec<ReplacementInstruction> = ordered
            .into_iter()
            .map(|sighting| self.instruction_for(sighting, map))
            .collect();

        self.warn_on_overlaps(&instructions);
        debug!(instructions = instructions.len(), "Replacement plan ready");
        instructions
    }

    fn instruction_for(
        &self,
        sighting: &PlaceholderSighting,
        map: &SubstitutionMap,
    ) -> ReplacementInstruction {
        let marker = sighting.marker();
        let value = match map.get(marker) {
            Some(value) => value.to_string(),
            None => {
                warn!(
                    marker = %marker,
                    page = sighting.page_index,
                    "No substitution for placeholder, blanking it"
                );
                String::new()
            }
        };

        let draw_lines = fit_text(
            &value,
            sighting.width,
            sighting.font_size,
            self.options.fit_policy,
        );

        ReplacementInstruction {
            mask_rect: sighting.page_bounds(sighting.local_box().inflate(self.options.mask_padding)),
            sighting: sighting.clone(),
            value,
            draw_lines,
        }
    }

    fn warn_on_overlaps(&self, instructions: &[ReplacementInstruction]) {
        for (i, a) in instructions.iter().enumerate() {
            for b in &instructions[i + 1..] {
                if a.page_index() == b.page_index() && a.mask_rect.intersects(&b.mask_rect) {
                    warn!(
                        page = a.page_index(),
                        first = %a.sighting.marker(),
                        second = %b.sighting.marker(),
                        "Placeholder masks overlap"
                    );
                }
            }
        }
    }
}

/// Lay `value` out within `max_width` at `font_size`. Runs of whitespace are
/// collapsed to single spaces first. Lines are returned top first.
pub fn fit_text(value: &str, max_width: f32, font_size: f32, policy: FitPolicy) -> Vec<String> {
    let normalized = value.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.is_empty() {
        return Vec::new();
    }
    match policy {
        FitPolicy::Truncate => {
            let line = truncate_to_width(&normalized, max_width, font_size);
            if line.is_empty() { Vec::new() } else { vec![line] }
        }
        FitPolicy::Wrap => wrap_to_width(&normalized, max_width, font_size),
    }
}

fn fits(text: &str, max_width: f32, font_size: f32) -> bool {
    StandardFont::Helvetica.text_width(text, font_size) <= max_width + FIT_TOLERANCE
}

fn truncate_to_width(text: &str, max_width: f32, font_size: f32) -> String {
    let mut chars: Vec<char> = text.chars().collect();
    while !chars.is_empty() && !fits(&chars.iter().collect::<String>(), max_width, font_size) {
        chars.pop();
    }
    chars.into_iter().collect::<String>().trim_end().to_string()
}

fn wrap_to_width(text: &str, max_width: f32, font_size: f32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split(' ') {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{current} {word}")
        };
        if fits(&candidate, max_width, font_size) {
            current = candidate;
            continue;
        }
        if !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if fits(word, max_width, font_size) {
            current = word.to_string();
        } else {
            // Break words that are wider than the placeholder on their own.
            for c in word.chars() {
                let mut next = current.clone();
                next.push(c);
                if current.is_empty() || fits(&next, max_width, font_size) {
                    current = next;
                } else {
                    lines.push(std::mem::replace(&mut current, c.to_string()));
                }
            }
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use formcast_core::{Point, TextSource};

    fn sighting(page_index: usize, x: f32, y: f32, marker: char, run: usize, font_size: f32) -> PlaceholderSighting {
        let width = StandardFont::Helvetica.text_width(&marker.to_string().repeat(run), font_size);
        PlaceholderSighting {
            page_index,
            position: Point { x, y },
            raw_text: marker.to_string().repeat(run),
            width,
            height: 0.925 * font_size,
            descent: -0.207 * font_size,
            font_size,
            rotation: 0.0,
            source: TextSource {
                op_index: 3,
                advance: width * 1000.0 / font_size,
                form: None,
            },
        }
    }

    fn planner(policy: FitPolicy) -> ReplacementPlanner {
        ReplacementPlanner::new(FillOptions {
            fit_policy: policy,
            ..FillOptions::default()
        })
    }

    #[test]
    fn short_value_is_drawn_as_is() {
        let map: SubstitutionMap = [('#', "Acme Corp")].into_iter().collect();
        let plan = planner(FitPolicy::Truncate).plan(&[sighting(0, 72.0, 700.0, '#', 20, 12.0)], &map);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].value, "Acme Corp");
        assert_eq!(plan[0].draw_lines, vec!["Acme Corp".to_string()]);
    }

    #[test]
    fn unresolved_marker_blanks_the_placeholder() {
        let map: SubstitutionMap = [('#', "Acme Corp")].into_iter().collect();
        let plan = planner(FitPolicy::Truncate).plan(&[sighting(0, 72.0, 700.0, '$', 15, 12.0)], &map);
        assert_eq!(plan[0].value, "");
        assert!(plan[0].draw_lines.is_empty());
        assert!(plan[0].mask_rect.contains(&plan[0].sighting.glyph_box()));
    }

    #[test]
    fn ordering_is_page_then_top_down_then_left_right() {
        let sightings = vec![
            sighting(1, 72.0, 700.0, '$', 5, 12.0),
            sighting(0, 300.0, 500.0, '*', 5, 12.0),
            sighting(0, 72.0, 500.0, '#', 5, 12.0),
            sighting(0, 72.0, 650.0, '&', 5, 12.0),
        ];
        let plan = planner(FitPolicy::Truncate).plan(&sightings, &SubstitutionMap::new());
        let order: Vec<char> = plan.iter().map(|i| i.sighting.marker()).collect();
        assert_eq!(order, vec!['&', '#', '*', '$']);
    }

    #[test]
    fn truncation_keeps_text_within_placeholder() {
        let long = "Federal Capital Territory Development Authority";
        let map: SubstitutionMap = [('*', long)].into_iter().collect();
        let s = sighting(0, 72.0, 700.0, '*', 8, 10.0);
        let plan = planner(FitPolicy::Truncate).plan(std::slice::from_ref(&s), &map);
        assert_eq!(plan[0].draw_lines.len(), 1);
        let line = &plan[0].draw_lines[0];
        assert!(long.starts_with(line.as_str()));
        assert!(line.len() < long.len());
        assert!(StandardFont::Helvetica.text_width(line, 10.0) <= s.width + FIT_TOLERANCE);
    }

    #[test]
    fn wrapping_keeps_every_line_within_placeholder() {
        let value = "Plot 12 Block C Lekki Phase One Lagos";
        let map: SubstitutionMap = [('*', value)].into_iter().collect();
        let s = sighting(0, 72.0, 700.0, '*', 12, 10.0);
        let plan = planner(FitPolicy::Wrap).plan(std::slice::from_ref(&s), &map);
        let lines = &plan[0].draw_lines;
        assert!(lines.len() > 1);
        for line in lines {
            assert!(StandardFont::Helvetica.text_width(line, 10.0) <= s.width + FIT_TOLERANCE);
        }
        assert_eq!(lines.join(" "), value);
    }

    #[test]
    fn overlong_word_is_broken() {
        let lines = fit_text("Supercalifragilistic", 20.0, 10.0, FitPolicy::Wrap);
        assert!(lines.len() > 1);
        assert_eq!(lines.concat(), "Supercalifragilistic");
    }

    #[test]
    fn mask_covers_glyph_box_across_font_sizes() {
        let map: SubstitutionMap = [('#', "x")].into_iter().collect();
        for size in [6.0, 8.0, 10.0, 12.0, 14.0, 18.0, 24.0] {
            let s = sighting(0, 50.0, 400.0, '#', 10, size);
            let plan = planner(FitPolicy::Truncate).plan(std::slice::from_ref(&s), &map);
            let glyph_box = s.glyph_box();
            assert!(plan[0].mask_rect.contains(&glyph_box), "size {size}");
        }
    }

    #[test]
    fn rotated_mask_stays_on_the_rotated_run() {
        let map: SubstitutionMap = [('#', "Acme Corp")].into_iter().collect();
        let s = PlaceholderSighting {
            rotation: std::f32::consts::FRAC_PI_2,
            ..sighting(0, 300.0, 400.0, '#', 20, 12.0)
        };
        let plan = planner(FitPolicy::Truncate).plan(std::slice::from_ref(&s), &map);
        let mask = plan[0].mask_rect;
        assert!(mask.contains(&s.glyph_box()));
        // Tall and narrow, not a horizontal strip to the right of x = 300.
        assert!(mask.width < 13.0, "{mask:?}");
        assert!(mask.height > 133.0, "{mask:?}");
        assert!(mask.right() < 303.5, "{mask:?}");
    }

    #[test]
    fn planning_is_deterministic() {
        let sightings = vec![
            sighting(0, 72.0, 700.0, '#', 20, 12.0),
            sighting(0, 72.0, 650.0, '*', 20, 12.0),
        ];
        let map: SubstitutionMap = [('#', "Acme Corp"), ('*', "Abuja")].into_iter().collect();
        let p = planner(FitPolicy::Wrap);
        assert_eq!(p.plan(&sightings, &map), p.plan(&sightings, &map));
    }

    #[test]
    fn whitespace_only_value_draws_nothing() {
        assert!(fit_text("   ", 100.0, 12.0, FitPolicy::Truncate).is_empty());
        assert_eq!(
            fit_text("Acme \n  Corp", 500.0, 12.0, FitPolicy::Truncate),
            vec!["Acme Corp".to_string()]
        );
    }
}
