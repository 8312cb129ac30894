/// Words used when generating phrases. Every entry is 3–8 lowercase ASCII letters.
pub const WORDS: &[&str] = &[
    "acorn", "amber", "anchor", "apple", "arrow", "aspen", "badger", "bamboo", "basil", "beacon",
    "birch", "bison", "blossom", "bramble", "brave", "breeze", "brook", "cactus", "canyon", "cedar",
    "cherry", "clover", "cobalt", "comet", "coral", "cotton", "crane", "cricket", "daisy", "dawn",
    "delta", "desert", "dolphin", "dune", "eagle", "ember", "falcon", "fern", "fig", "firefly",
    "forest", "fox", "frost", "garnet", "gecko", "ginger", "glacier", "harbor", "hazel", "heron",
    "honey", "iris", "island", "ivory", "jasper", "juniper", "kestrel", "kiwi", "lagoon", "lantern",
    "lemon", "lilac", "lotus", "lynx", "maple", "meadow", "mint", "moose", "nectar", "nutmeg",
    "oak", "ocean", "olive", "orchid", "otter", "owl", "panda", "pebble", "pepper", "pine",
    "plum", "quartz", "quill", "rain", "raven", "reef", "river", "robin", "saffron", "sage",
    "salmon", "sparrow", "spruce", "stone", "sunset", "thistle", "thunder", "tiger", "tulip",
    "velvet", "violet", "walnut", "willow", "wren", "yarrow", "zephyr",
];
