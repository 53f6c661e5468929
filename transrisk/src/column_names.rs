//! This module stores the column names shared by the importers, the merger, the decomposer and the
//! renderers. Names match the ones found in the raw files and in the downstream statistical
//! scripts, so they must not be changed independently.

// Identifiers
pub const GVKEY: &str = "gvkey";
pub const IID: &str = "iid";
pub const ISO2: &str = "iso2";
pub const ISO3: &str = "iso3";
pub const COUNTRY_NAME: &str = "country_name";
pub const COUNTRY_ISO2: &str = "country_iso2";
pub const LOC: &str = "loc";
pub const LOC_ISO2: &str = "loc_iso2";
pub const LOC_CNAME: &str = "loc_cname";

// Periods
pub const YEAR: &str = "year";
pub const DATE_Q: &str = "dateQ";
pub const DATADATE: &str = "datadate";

// Firm attributes
pub const CONM: &str = "conm";
pub const SIC: &str = "sic";
pub const NAICS: &str = "naics";

// Risk panel
pub const RISK: &str = "risk";
pub const RISK_FIN: &str = "risk_fin";
pub const RISK_NFIN: &str = "risk_nfin";
pub const RISK_HQ: &str = "risk_hq";
pub const RISK_NHQ: &str = "risk_nhq";

// Compustat security daily
pub const PRCCD: &str = "prccd";
pub const CSHOC: &str = "cshoc";
pub const EXCHANGE_RATE_TO_USD: &str = "exchange_rate_toUSD";
pub const MARKETCAP: &str = "marketcap";
pub const MARKETCAP_SUM: &str = "marketcap_sum";
pub const MARKETCAP_MEDIAN: &str = "marketcap_median";
pub const MARKETCAP_FIRST: &str = "marketcap_first";

// World Bank
pub const WB_COUNTRY_NAME: &str = "Country Name";
pub const WB_TIME: &str = "Time";
pub const WB_GDP: &str = "GDP (constant 2015 US$) [NY.GDP.MKTP.KD]";
pub const GDP: &str = "gdp";
pub const SHARE: &str = "share";

// Coverage
pub const OUR_COUNTRIES: &str = "our_countries";
pub const COUNTRY_COMPUSTAT: &str = "country_compustat";
pub const COUNTRY_EARNINGSCALLS: &str = "country_earningscalls";
pub const COUNTRYISO2_EARNINGSCALLS: &str = "countryiso2_earningscalls";
pub const COUNTRY_COMBINED: &str = "country_combined";
pub const MERGE_NAMES: &str = "_merge_names";
pub const MERGE_ISO2_TO_NAMES: &str = "_merge_iso2tonames";
pub const MERGE_COMPUSTAT: &str = "_merge_compustat";
pub const SALE_SEG_DUMMY: &str = "sale_seg_dummy";

// Transmission risk panel
pub const CRISIS_NR: &str = "crisis_nr";
pub const FIRM_TYPE: &str = "type";
pub const TRANSMISSION_RISK_EXCL: &str = "mTREXCL";
pub const TRANSMISSION_RISK_CRISIS: &str = "TransmissionRiskCrisis";
pub const NR_OF_FIRMS: &str = "nr_of_firms";
pub const TRANSMISSION_RISK_ALL: &str = "TransmissionRiskALL";
pub const NR_OF_FIRMS_ALL: &str = "nr_of_firmsALL";

// Crisis curves
pub const CURVE_INDEX: &str = "index";
pub const Y: &str = "y";
pub const Y_PRED: &str = "y_pred";
pub const X: &str = "x";
pub const WEIGHTS: &str = "weights";
pub const COLOR: &str = "color";
pub const LABEL: &str = "label";
pub const ANNOTATION: &str = "annotation";
pub const GROUP: &str = "group";

// Crisis overview (written by an external stage)
pub const CRISIS_ABBREV: &str = "crisis_abbrev";
pub const ALPHA: &str = "alpha";
pub const ALPHA_FIN_P: &str = "alphaFIN_p";
pub const YPRED_XMED_ALL: &str = "ypredXmedALL";
pub const RATIO: &str = "ratio";
pub const BETA_ALL: &str = "betaALL";
pub const PVAL_ALL: &str = "pvalALL";
pub const R2: &str = "r2";

// N-grams
pub const NGRAM: &str = "ngram";
pub const TFIDF: &str = "tfidf";
pub const COUNT: &str = "count";
pub const MODIFIED: &str = "modified";
pub const FROM_GEONAMES: &str = "from_geonames";

// Coverage distribution
pub const IN_TR: &str = "inTR";
pub const ALL_FIRMS: &str = "All";
pub const WITH_MC: &str = "withMC";
pub const TOT_MC: &str = "totMC";
pub const IN_TR_AND_MC: &str = "inTRandMC";
pub const PCT_TR: &str = "pctTR";
pub const PCT_MC: &str = "pctMC";
pub const PCT_MC_AND_TR: &str = "pctMCandTR";
pub const SEG: &str = "seg";
pub const SHARE_GDP: &str = "shareGDP";
