// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Built-in resource catalog.
//!
//! Six resources, each localised in every supported language. Ids, categories,
//! icons and offline flags are shared across languages; only the text differs.

use crate::download::ResourceItem;
use crate::types::{Language, ResourceCategory};

/// (id, category, icon, offline available)
const LAYOUT: [(&str, ResourceCategory, &str, bool); 6] = [
    ("1", ResourceCategory::Finance, "Smartphone", true),
    ("2", ResourceCategory::Healthcare, "Stethoscope", false),
    ("3", ResourceCategory::Agriculture, "Leaf", true),
    ("4", ResourceCategory::Finance, "Lock", true),
    ("5", ResourceCategory::Government, "Landmark", false),
    ("6", ResourceCategory::Education, "BookOpen", true),
];

const ENGLISH: [(&str, &str); 6] = [
    ("UPI Payments Basics", "Learn how to use BHIM and PhonePe safely."),
    ("Telehealth Consultation Guide", "How to book and attend a doctor appointment online."),
    ("Government Crop Insurance", "Step-by-step guide to apply for PMFBY."),
    ("Online Banking Security", "Tips to keep your bank account safe from fraud."),
    ("Digital Land Records", "How to access and read digital land records."),
    ("Online School Admission", "Applying for school admission through online portals."),
];

const HINDI: [(&str, &str); 6] = [
    ("यूपीआई भुगतान की मूल बातें", "भीम और फोनपे का सुरक्षित उपयोग करना सीखें।"),
    ("टेलीहेल्थ परामर्श गाइड", "डॉक्टर से ऑनलाइन अपॉइंटमेंट कैसे बुक करें।"),
    ("प्रधानमंत्री फसल बीमा योजना", "PMFBY के लिए आवेदन करने की चरण-दर-चरण मार्गदर्शिका।"),
    ("ऑनलाइन बैंकिंग सुरक्षा", "अपने बैंक खाते को धोखाधड़ी से सुरक्षित रखने के सुझाव।"),
    ("डिजिटल भूमि रिकॉर्ड", "डिजिटल भूमि रिकॉर्ड तक कैसे पहुँचें और पढ़ें।"),
    ("ऑनलाइन स्कूल प्रवेश", "ऑनलाइन पोर्टलों के माध्यम से स्कूल प्रवेश के लिए आवेदन करना।"),
];

const TELUGU: [(&str, &str); 6] = [
    ("UPI చెల్లింపుల ప్రాథమిక అంశాలు", "BHIM మరియు PhonePe సురక్షితంగా ఎలా ఉపయోగించాలో తెలుసుకోండి."),
    ("టెలీహెల్త్ కన్సల్టేషన్ గైడ్", "డాక్టర్ అపాయింట్‌మెంట్‌ని ఆన్‌లైన్‌లో ఎలా బుక్ చేసుకోవాలి."),
    ("ప్రభుత్వ పంటల బీమా", "PMFBY కోసం దరఖాస్తు చేయడానికి దశలవారీ గైడ్."),
    ("ఆన్‌లైన్ బ్యాంకింగ్ భద్రత", "మీ బ్యాంక్ ఖాతాను మోసం నుండి సురక్షితంగా ఉంచడానికి చిట్కాలు."),
    ("డిజిటల్ భూ రికార్డులు", "డిజిటల్ భూమి రికార్డులను ఎలా యాక్సెస్ చేయాలి మరియు చదవాలి."),
    ("ఆన్‌లైన్ స్కూల్ అడ్మిషన్", "ఆన్‌లైన్ పోర్టల్‌ల ద్వారా పాఠశాల ప్రవేశానికి దరఖాస్తు చేయడం."),
];

const TAMIL: [(&str, &str); 6] = [
    ("UPI கட்டண அடிப்படைகள்", "BHIM மற்றும் PhonePe ஐ எவ்வாறு பாதுகாப்பாகப் பயன்படுத்துவது என்பதை அறியவும்."),
    ("டெலிஹெல்த் ஆலோசனை வழிகாட்டி", "ஆன்லைனில் மருத்துவ சந்திப்பை முன்பதிவு செய்வது எப்படி."),
    ("அரசு பயிர் காப்பீடு", "PMFBY க்கு விண்ணப்பிப்பதற்கான படிப்படியான வழிகாட்டி."),
    ("ஆன்லைன் வங்கி பாதுகாப்பு", "மோசடியிலிருந்து உங்கள் வங்கிக் கணக்கைப் பாதுகாப்பாக வைப்பதற்கான உதவிக்குறிப்புகள்."),
    ("டிஜிட்டல் நில பதிவுகள்", "டிஜிட்டல் நிலப் பதிவுகளை எவ்வாறு அணுகுவது மற்றும் படிப்பது."),
    ("ஆன்லைன் பள்ளி சேர்க்கை", "ஆன்லைன் இணையதளங்கள் மூலம் பள்ளி சேர்க்கைக்கு விண்ணப்பித்தல்."),
];

const MALAYALAM: [(&str, &str); 6] = [
    ("UPI പേയ്‌മെൻ്റ് അടിസ്ഥാനങ്ങൾ", "BHIM, PhonePe എന്നിവ എങ്ങനെ സുരക്ഷിതമായി ഉപയോഗിക്കാമെന്ന് മനസിലാക്കുക."),
    ("ടെലിഹെൽത്ത് കൺസൾട്ടേഷൻ ഗൈഡ്", "ഓൺലൈനിൽ ഡോക്ടർ അപ്പോയിൻ്റ്മെൻ്റ് എങ്ങനെ ബുക്ക് ചെയ്യാം."),
    ("സർക്കാർ വിള ഇൻഷുറൻസ്", "PMFBY-ക്കായി അപേക്ഷിക്കുന്നതിനുള്ള ഘട്ടം ഘട്ടമായുള്ള ഗൈഡ്."),
    ("ഓൺലൈൻ ബാങ്കിംഗ് സുരക്ഷ", "തട്ടിപ്പിൽ നിന്ന് നിങ്ങളുടെ ബാങ്ക് അക്കൗണ്ട് സുരക്ഷിതമായി സൂക്ഷിക്കുന്നതിനുള്ള നുറുങ്ങുകൾ."),
    ("ഡിജിറ്റൽ ഭൂരേഖകൾ", "ഡിജിറ്റൽ ഭൂരേഖകൾ എങ്ങനെ ആക്സസ് ചെയ്യാം, വായിക്കാം."),
    ("ഓൺലൈൻ സ്കൂൾ അഡ്മിഷൻ", "ഓൺലൈൻ പോർട്ടലുകൾ വഴി സ്കൂൾ പ്രവേശനത്തിന് അപേക്ഷിക്കുന്നു."),
];

/// Title and description table for a language.
fn texts(language: Language) -> &'static [(&'static str, &'static str); 6] {
    match language {
        Language::English => &ENGLISH,
        Language::Hindi => &HINDI,
        Language::Telugu => &TELUGU,
        Language::Tamil => &TAMIL,
        Language::Malayalam => &MALAYALAM,
    }
}

/// The seed catalog for `language`, every item idle.
pub fn seed_resources(language: Language) -> Vec<ResourceItem> {
    LAYOUT
        .iter()
        .zip(texts(language).iter())
        .map(|((id, category, icon, offline), (title, description))| {
            ResourceItem::new(*id, *title, *description, *category, *icon, *offline)
        })
        .collect()
}
