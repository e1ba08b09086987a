//! Allergen and restriction matching.
//!
//! Plain case-folded substring matching, no word boundaries: "pineapple"
//! matches an allergen of "apple". Well-known allergen group names
//! ("shellfish", "tree nuts", "dairy", ...) also match their members, so an
//! allergy to shellfish flags "2 lbs shrimp". A group can list look-alike
//! phrases that are not members ("peanut butter" for dairy, "rice flour" for
//! gluten); those are masked out before members are matched, but never
//! before the profile's literal term. Reasons always quote the profile's own
//! wording.

use mise_core::DietaryProfile;

use crate::types::DisallowedMatch;

/// A group name, the ingredient words it covers, and phrases that contain a
/// member word without being one.
struct Family {
    name: &'static str,
    members: &'static [&'static str],
    except: &'static [&'static str],
}

const FAMILIES: &[Family] = &[
    Family {
        name: "shellfish",
        members: &[
            "shrimp", "prawn", "crab", "lobster", "crayfish", "crawfish", "langoustine",
            "scallop", "clam", "mussel", "oyster",
        ],
        except: &["oyster mushroom"],
    },
    Family {
        name: "crustacean",
        members: &["shrimp", "prawn", "crab", "lobster", "crayfish", "crawfish", "langoustine"],
        except: &[],
    },
    Family {
        name: "fish",
        members: &["salmon", "tuna", "cod", "anchov", "sardine", "tilapia", "halibut", "trout", "mackerel"],
        except: &[],
    },
    Family {
        name: "tree nut",
        members: &["almond", "cashew", "walnut", "pecan", "pistachio", "hazelnut", "macadamia", "brazil nut"],
        except: &[],
    },
    Family {
        name: "dairy",
        members: &["milk", "cheese", "butter", "cream", "yogurt", "yoghurt", "ghee", "parmesan"],
        except: &[
            "peanut butter", "almond butter", "cashew butter", "nut butter", "apple butter",
            "cocoa butter", "cream of tartar", "coconut milk", "coconut cream", "almond milk",
            "oat milk", "soy milk", "rice milk", "butternut",
        ],
    },
    Family {
        name: "gluten",
        members: &["wheat", "flour", "barley", "rye", "breadcrumb", "panko", "pasta", "noodle"],
        except: &[
            "rice flour", "almond flour", "coconut flour", "corn flour", "chickpea flour",
            "tapioca flour", "rice noodle", "glass noodle", "buckwheat",
        ],
    },
    Family {
        name: "egg",
        members: &["mayonnaise"],
        except: &[],
    },
];

/// Flag every ingredient whose case-folded text contains a case-folded
/// allergen or restriction. Allergens are tried first; each ingredient is
/// reported once with its first matching reason, in ingredient order.
pub fn check(ingredients: &[String], profile: &DietaryProfile) -> Vec<DisallowedMatch> {
    let allergens = folded_terms(&profile.allergens);
    let restrictions = folded_terms(&profile.restrictions);
    if allergens.is_empty() && restrictions.is_empty() {
        return Vec::new();
    }

    ingredients
        .iter()
        .filter_map(|ingredient| {
            let folded = ingredient.to_lowercase();
            let reason = allergens
                .iter()
                .find(|term| term.matches(&folded))
                .map(|term| format!("allergy: {}", term.original))
                .or_else(|| {
                    restrictions
                        .iter()
                        .find(|term| term.matches(&folded))
                        .map(|term| format!("restriction: {}", term.original))
                })?;
            Some(DisallowedMatch {
                ingredient: ingredient.clone(),
                reason,
            })
        })
        .collect()
}

struct Term<'a> {
    original: &'a str,
    folded: String,
    family: Option<&'static Family>,
}

impl Term<'_> {
    fn matches(&self, folded_ingredient: &str) -> bool {
        if folded_ingredient.contains(self.folded.as_str()) {
            return true;
        }
        let Some(family) = self.family else {
            return false;
        };
        let masked = family
            .except
            .iter()
            .fold(folded_ingredient.to_string(), |text, phrase| text.replace(phrase, " "));
        family.members.iter().any(|m| masked.contains(m))
    }
}

/// Case-folded terms with their family members, blank entries dropped.
fn folded_terms(terms: &[String]) -> Vec<Term<'_>> {
    terms
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(|original| {
            let folded = original.to_lowercase();
            let family = family_of(&folded);
            Term {
                original,
                folded,
                family,
            }
        })
        .collect()
}

/// Group for a name, accepting simple plurals ("tree nuts", "eggs").
fn family_of(folded: &str) -> Option<&'static Family> {
    let singular = folded.strip_suffix('s').unwrap_or(folded);
    FAMILIES
        .iter()
        .find(|f| f.name == folded || f.name == singular)
}
